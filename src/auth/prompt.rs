use std::io::{self, BufRead, IsTerminal, Write};

/// Source of the user's verification code.
///
/// Blocking by contract: the session runs it off the async executor with a
/// timeout, so implementations can simply read and return.
pub trait VerifierPrompt: Send + Sync {
    /// Show the authorization URL and return the code the user typed.
    fn ask(&self, authorization_url: &str) -> io::Result<String>;
}

/// Reads the code from the controlling terminal.
pub struct StdinPrompt;

impl VerifierPrompt for StdinPrompt {
    fn ask(&self, authorization_url: &str) -> io::Result<String> {
        if !io::stdin().is_terminal() {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "stdin is not a terminal; run interactively once to authorize",
            ));
        }

        let mut out = io::stdout();
        writeln!(out)?;
        writeln!(out, "Open this URL in your browser and authorize read access:")?;
        writeln!(out)?;
        writeln!(out, "    {authorization_url}")?;
        writeln!(out)?;
        write!(out, "Enter the verification code shown by Flickr: ")?;
        out.flush()?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}
