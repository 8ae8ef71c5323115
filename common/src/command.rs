/// Console commands understood by the daemon front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run a backup cycle now, queued behind any running cycle.
    Backup,
    /// Graceful shutdown.
    Stop,
}

impl Command {
    /// Case-insensitive; anything unrecognized yields `None` and is ignored by the caller.
    pub fn parse(line: &str) -> Option<Self> {
        let word = line.trim();
        if word.eq_ignore_ascii_case("backup") {
            Some(Command::Backup)
        } else if word.eq_ignore_ascii_case("stop") {
            Some(Command::Stop)
        } else {
            None
        }
    }
}
