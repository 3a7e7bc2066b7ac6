use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "sitemap-watch",
    about = "Follow openHAB sitemap pages live from the terminal",
    version
)]
pub struct Cli {
    #[arg(
        long = "server",
        global = true,
        env = "OPENHAB_URL",
        default_value = "http://localhost:8080/",
        help = "Base URL of the openHAB server"
    )]
    pub server_url: String,

    #[arg(long, global = true, env = "OPENHAB_USERNAME", help = "Basic auth user")]
    pub username: Option<String>,

    #[arg(
        long,
        global = true,
        env = "OPENHAB_PASSWORD",
        hide_env_values = true,
        help = "Basic auth password"
    )]
    pub password: Option<String>,

    #[arg(
        long = "log-filter",
        global = true,
        env = "RUST_LOG",
        default_value = "warn,sitemap_sync=info",
        help = "tracing filter directives"
    )]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the sitemaps the server offers.
    List,
    /// Print a sitemap page and every change to it until interrupted.
    Watch {
        /// Sitemap name as shown by `list`.
        sitemap: String,

        #[arg(long, value_name = "PAGE_ID", help = "Open this page instead of the homepage")]
        page: Option<String>,

        #[arg(long, help = "Print updates as JSON lines")]
        json: bool,
    },
}
