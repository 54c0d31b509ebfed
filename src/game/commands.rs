//! Player command parsing

/// One parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Attack(String),
    Flee,
    Look,
    Go(String),
    Take(String),
    Bind,
    Status,
    Inventory,
    Help,
    /// A lone word that is not a verb, tried as an exit name
    Bare(String),
    Unknown(String),
}

impl Command {
    /// Parse a line. Returns `None` for blank input.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((v, r)) => (v, r.trim()),
            None => (line, ""),
        };
        let verb = verb.to_ascii_lowercase();
        let arg = rest.to_string();

        let cmd = match verb.as_str() {
            "attack" | "kill" | "k" => Command::Attack(arg),
            "flee" => Command::Flee,
            "look" | "l" => Command::Look,
            "go" | "walk" => Command::Go(arg),
            "take" | "get" => Command::Take(arg),
            "bind" => Command::Bind,
            "status" | "score" | "sc" => Command::Status,
            "inventory" | "inv" | "i" => Command::Inventory,
            "help" | "?" => Command::Help,
            _ if rest.is_empty() => Command::Bare(verb),
            _ => Command::Unknown(verb),
        };
        Some(cmd)
    }

    /// Whether the command is refused while engaged
    pub fn needs_idle(&self) -> bool {
        matches!(self, Command::Go(_) | Command::Bind)
    }
}

pub const HELP_TEXT: &str = "\
Commands:
  attack <target>   start fighting an enemy in this room (also: kill)
  flee              try to escape the fight
  look              describe your surroundings
  go <exit>         walk through an exit (or just type the exit name)
  take <item>       pick up an item (also: get)
  bind              make this room your recall point
  status            show your character (also: score)
  inventory         list what you carry (also: inv)
  help              this text";
