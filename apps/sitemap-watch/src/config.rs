use anyhow::{Context, Result};
use sitemap_sync::{HttpPageClient, SyncConfig};
use url::Url;

use crate::cli::Cli;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_url: Url,
    pub username: Option<String>,
    pub password: Option<String>,
    pub sync: SyncConfig,
}

impl AppConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mut raw = cli.server_url.trim().to_string();
        // relative joins drop the last path segment without it
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let server_url =
            Url::parse(&raw).with_context(|| format!("invalid server url {:?}", cli.server_url))?;
        Ok(Self {
            server_url,
            username: cli.username.clone().filter(|u| !u.is_empty()),
            password: cli.password.clone(),
            sync: SyncConfig::from_env(),
        })
    }

    pub fn http_client(&self) -> HttpPageClient {
        let client = HttpPageClient::new(self.server_url.clone());
        match &self.username {
            Some(user) => client.with_basic_auth(user.clone(), self.password.clone()),
            None => client,
        }
    }

    /// Page url for `page_id` inside `sitemap`, next to its homepage.
    pub fn page_url(&self, homepage_link: &str, sitemap: &str, page_id: &str) -> Result<String> {
        if let Some((base, _)) = homepage_link.rsplit_once('/') {
            if !base.is_empty() {
                return Ok(format!("{base}/{page_id}"));
            }
        }
        let url = self
            .server_url
            .join(&format!("rest/sitemaps/{sitemap}/{page_id}"))
            .context("building page url")?;
        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn config(args: &[&str]) -> AppConfig {
        let cli = Cli::try_parse_from(args).unwrap();
        AppConfig::from_cli(&cli).unwrap()
    }

    #[test]
    fn server_url_gets_trailing_slash() {
        let cfg = config(&["sitemap-watch", "--server", "http://hab.local:8080/openhab", "list"]);
        assert_eq!(cfg.server_url.as_str(), "http://hab.local:8080/openhab/");
    }

    #[test]
    fn page_url_follows_homepage_link() {
        let cfg = config(&["sitemap-watch", "--server", "http://hab.local/", "list"]);
        assert_eq!(
            cfg.page_url("http://hab.local/rest/sitemaps/demo/demo", "demo", "0001")
                .unwrap(),
            "http://hab.local/rest/sitemaps/demo/0001"
        );
        assert_eq!(
            cfg.page_url("", "demo", "0001").unwrap(),
            "http://hab.local/rest/sitemaps/demo/0001"
        );
    }
}
