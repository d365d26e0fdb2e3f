use std::process::Command;

/// Opens a 3-D Secure confirmation page for a human to complete.
///
/// Flows only hand the URL over; whether it opens never affects the result
/// of the step.
pub trait Browser {
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// Does nothing; the URL is logged for the operator.
pub struct NoBrowser;

impl Browser for NoBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        tracing::info!(%url, "3-D Secure confirmation required, no browser configured");
        Ok(())
    }
}

/// Opens the URL in a named macOS application through `osascript`.
pub struct AppleScriptBrowser {
    application: String,
}

impl AppleScriptBrowser {
    pub fn new(application: impl Into<String>) -> Self {
        Self {
            application: application.into(),
        }
    }

    fn run(&self, script: &str) -> std::io::Result<()> {
        let status = Command::new("osascript").arg("-e").arg(script).status()?;
        if !status.success() {
            return Err(std::io::Error::other(format!("osascript exited with {status}")));
        }
        Ok(())
    }
}

/// Quote a value as an AppleScript string literal.
fn applescript_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

impl Browser for AppleScriptBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        if url.trim().is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty redirect URL",
            ));
        }
        let app = applescript_string(&self.application);
        self.run(&format!(
            "tell application {} to open location {}",
            app,
            applescript_string(url)
        ))?;
        // Bring the window to the front.
        self.run(&format!("tell application {} to activate", app))
    }
}
