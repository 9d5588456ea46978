//! guestlist - manage events, contacts, guest lists and RSVPs from the terminal.

mod commands;
mod context;
mod output;

use auth_engine::OAuthProvider;
use clap::{Parser, Subcommand};
use commands::contacts::ContactFields;
use commands::events::CreateArgs;
use commands::serve::SeedUser;
use context::AppContext;
use guest_store::RsvpStatus;
use guestlist_config_and_utils::{init_logging, Config, Paths};
use output::OutputFormat;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser)]
#[command(name = "guestlist")]
#[command(about = "Events, guest lists and RSVPs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: OutputFormat,

    /// Log level (trace, debug, info, warn, error). Defaults to the config value.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, session and logs. Defaults to ~/.guestlist
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the email existence endpoint
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8787")]
        bind: SocketAddr,
        /// Answer from an in-memory account list instead of the backend
        #[arg(long)]
        offline: bool,
        /// Account for the offline list: `email` or `email:unverified`
        #[arg(long = "seed-user")]
        seed_users: Vec<SeedUser>,
    },

    /// Sign in (password, one-time code, magic link or a provider)
    Login {
        /// Email address; prompted for when omitted
        #[arg(short, long)]
        email: Option<String>,
        /// Sign in through a provider in the browser (google, github)
        #[arg(long)]
        oauth: Option<OAuthProvider>,
    },

    /// Sign out and forget the stored session
    Logout,

    /// Show who is signed in
    Status,

    /// Manage events
    Events {
        #[command(subcommand)]
        command: EventCommands,
    },

    /// Manage your address book
    Contacts {
        #[command(subcommand)]
        command: ContactCommands,
    },

    /// Manage an event's guest list
    Guests {
        #[command(subcommand)]
        command: GuestCommands,
    },

    /// Respond to an invitation, or read the responses to your event
    Rsvp {
        #[command(subcommand)]
        command: RsvpCommands,
    },
}

#[derive(Subcommand)]
enum EventCommands {
    /// List your events
    List,
    /// Create an event
    Create {
        #[arg(short, long)]
        name: String,
        /// When it happens: `2026-09-12 19:00`, `2026-09-12` or RFC 3339
        #[arg(short, long)]
        date: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(short, long)]
        location: Option<String>,
        /// Hide the event from public listings
        #[arg(long)]
        private: bool,
    },
    /// Show one event and its RSVP link
    Show {
        /// Event ID
        id: String,
    },
}

#[derive(Subcommand)]
enum ContactCommands {
    /// List contacts
    List {
        /// Only contacts whose name, email or phone contains this
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Add a contact
    Add {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: Option<String>,
        #[arg(short, long)]
        phone: Option<String>,
    },
    /// Change a contact; pass an empty value to clear email or phone
    Edit {
        /// Contact ID
        id: String,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        email: Option<String>,
        #[arg(short, long)]
        phone: Option<String>,
    },
    /// Delete a contact
    Delete {
        /// Contact ID
        id: String,
    },
    /// Import contacts from a .csv or .vcf file
    Import {
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum GuestCommands {
    /// List the guests of an event
    List {
        #[arg(short, long)]
        event: String,
    },
    /// Contacts not yet on the guest list
    Available {
        #[arg(short, long)]
        event: String,
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Add contacts to the guest list
    Add {
        #[arg(short, long)]
        event: String,
        /// Contact IDs
        #[arg(required = true)]
        contacts: Vec<String>,
    },
    /// Remove a contact from the guest list
    Remove {
        #[arg(short, long)]
        event: String,
        /// Contact ID
        contact: String,
    },
}

#[derive(Subcommand)]
enum RsvpCommands {
    /// Respond to an invitation (no account needed)
    Submit {
        /// Event ID from the invitation link
        event: String,
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: String,
        /// attending or not-attending
        #[arg(short, long, default_value = "attending")]
        status: RsvpStatus,
    },
    /// Responses to one of your events
    List {
        #[arg(short, long)]
        event: String,
    },
}

/// Screen each command stands for, as seen by the route guard.
fn route_for(command: &Commands) -> Option<String> {
    match command {
        Commands::Serve { .. } | Commands::Logout | Commands::Status => None,
        Commands::Login { .. } => Some(auth_engine::LOGIN_PATH.to_string()),
        Commands::Events { command } => Some(match command {
            EventCommands::List => auth_engine::HOME_PATH.to_string(),
            EventCommands::Create { .. } => "/events/new".to_string(),
            EventCommands::Show { id } => format!("/events/{}", id),
        }),
        Commands::Contacts { .. } => Some("/contacts".to_string()),
        Commands::Guests { .. } => Some("/guest-list".to_string()),
        Commands::Rsvp { command } => Some(match command {
            RsvpCommands::Submit { event, .. } => format!("/rsvp/{}", event),
            RsvpCommands::List { event } => format!("/events/{}", event),
        }),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match &cli.base_dir {
        Some(base) => Paths::with_base_dir(base.clone()),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;
    let level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    paths.ensure_dirs()?;
    init_logging("guestlist", &level, Some(paths.log_file()));

    let ctx = AppContext::with_config(paths, config, cli.format)?;
    if let Err(err) = run(&ctx, cli.command).await {
        output::print_error(&err.to_string(), ctx.format);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(ctx: &AppContext, command: Commands) -> anyhow::Result<()> {
    let format = ctx.format;
    let route = route_for(&command);
    debug!(route = route.as_deref().unwrap_or("-"), "dispatching command");

    // Commands on protected screens need a signed-in user.
    let owner = match route.as_deref() {
        Some(path) if auth_engine::access_for(path) == auth_engine::RouteAccess::Protected => {
            Some(ctx.authorize(path).await?.id)
        }
        _ => None,
    };
    let owner_id = owner.as_deref().unwrap_or_default();

    match command {
        Commands::Serve {
            bind,
            offline,
            seed_users,
        } => commands::serve::run(&ctx.config, bind, offline, &seed_users).await,
        Commands::Login { email, oauth } => commands::auth::login(ctx, email, oauth).await,
        Commands::Logout => commands::auth::logout(ctx).await,
        Commands::Status => commands::auth::status(ctx).await,
        Commands::Events { command } => {
            let store = ctx.user_store().await?;
            match command {
                EventCommands::List => commands::events::list(store, owner_id, format).await,
                EventCommands::Create {
                    name,
                    date,
                    description,
                    location,
                    private,
                } => {
                    let args = CreateArgs {
                        name,
                        date,
                        description,
                        location,
                        private,
                    };
                    commands::events::create(store, owner_id, args, &ctx.config, format).await
                }
                EventCommands::Show { id } => {
                    commands::events::show(store, owner_id, &id, &ctx.config, format).await
                }
            }
        }
        Commands::Contacts { command } => {
            let store = ctx.user_store().await?;
            match command {
                ContactCommands::List { search } => {
                    commands::contacts::list(store, owner_id, search.as_deref(), format).await
                }
                ContactCommands::Add { name, email, phone } => {
                    let fields = ContactFields {
                        name: Some(name),
                        email,
                        phone,
                    };
                    commands::contacts::add(store, owner_id, fields, format).await
                }
                ContactCommands::Edit {
                    id,
                    name,
                    email,
                    phone,
                } => {
                    let fields = ContactFields { name, email, phone };
                    commands::contacts::edit(store, owner_id, &id, fields, format).await
                }
                ContactCommands::Delete { id } => {
                    commands::contacts::delete(store, owner_id, &id, format).await
                }
                ContactCommands::Import { path } => {
                    commands::contacts::import_file(store, owner_id, &path, format).await
                }
            }
        }
        Commands::Guests { command } => {
            let store = ctx.user_store().await?;
            match command {
                GuestCommands::List { event } => {
                    commands::guests::list(store, owner_id, &event, format).await
                }
                GuestCommands::Available { event, search } => {
                    commands::guests::available(store, owner_id, &event, search.as_deref(), format)
                        .await
                }
                GuestCommands::Add { event, contacts } => {
                    commands::guests::add(store, owner_id, &event, &contacts, format).await
                }
                GuestCommands::Remove { event, contact } => {
                    commands::guests::remove(store, owner_id, &event, &contact, format).await
                }
            }
        }
        Commands::Rsvp { command } => match command {
            RsvpCommands::Submit {
                event,
                name,
                email,
                status,
            } => {
                let store = ctx.public_store()?;
                commands::rsvp::submit(store, &event, &name, &email, status, format).await
            }
            RsvpCommands::List { event } => {
                let store = ctx.user_store().await?;
                commands::rsvp::list(store, &event, format).await
            }
        },
    }
}
