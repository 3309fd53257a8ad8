//! OpenLink: open a URL in the default browser.

use std::process::Command;
use std::sync::Arc;

use launchgrid_core::{
    parse_args, unknown_action, ActionContext, ActionError, ActionGroup, ActionSlot, Handler,
};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenLinkArgs {
    pub url: String,
}

pub struct OpenLink;

impl ActionGroup for OpenLink {
    fn name(&self) -> &'static str {
        "OpenLink"
    }

    fn build(
        &self,
        args: &serde_json::Value,
        slots: &[ActionSlot],
        _context: &ActionContext,
    ) -> Result<Vec<Handler>, ActionError> {
        let args: OpenLinkArgs = parse_args(self.name(), args)?;
        if args.url.trim().is_empty() {
            return Err(ActionError::InvalidArgs {
                group: self.name().to_string(),
                message: "url must not be empty".to_string(),
            });
        }

        slots
            .iter()
            .map(|slot| match slot.name.as_str() {
                "run" => {
                    let url = args.url.clone();
                    Ok(Arc::new(move || {
                        if let Err(e) = open_url(&url) {
                            log::error!("Failed to open {}: {}", url, e);
                        }
                    }) as Handler)
                }
                _ => Err(unknown_action(self.name(), slot)),
            })
            .collect()
    }
}

/// Hand the URL to the platform's opener.
fn open_url(url: &str) -> std::io::Result<()> {
    log::info!("Opening {}", url);
    opener_command(url).spawn().map(|_| ())
}

#[cfg(target_os = "macos")]
fn opener_command(url: &str) -> Command {
    let mut command = Command::new("open");
    command.arg(url);
    command
}

#[cfg(target_os = "windows")]
fn opener_command(url: &str) -> Command {
    let mut command = Command::new("cmd");
    command.args(["/C", "start", "", url]);
    command
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn opener_command(url: &str) -> Command {
    let mut command = Command::new("xdg-open");
    command.arg(url);
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args() {
        let args: OpenLinkArgs =
            parse_args("OpenLink", &serde_json::json!({ "url": "https://example.org" })).unwrap();
        assert_eq!(args.url, "https://example.org");

        let err = parse_args::<OpenLinkArgs>(
            "OpenLink",
            &serde_json::json!({ "url": "https://example.org", "browser": "lynx" }),
        )
        .unwrap_err();
        assert!(matches!(err, ActionError::InvalidArgs { .. }));

        assert!(parse_args::<OpenLinkArgs>("OpenLink", &serde_json::Value::Null).is_err());
    }

    #[test]
    fn test_opener_receives_url() {
        let command = opener_command("https://example.org/a b");
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(
            args.last().and_then(|a| a.to_str()),
            Some("https://example.org/a b")
        );
    }
}
