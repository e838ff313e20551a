//! Line commands understood by the terminal client.

use kurbo::Point;
use pairsketch_core::editor::UnknownTool;
use pairsketch_core::shapes::{ColorParseError, SerializableColor};
use pairsketch_core::{Modifiers, Tool};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// A parsed command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Print the local identifier
    Id,
    /// Connect to a remote peer
    Connect(String),
    /// Close the current channel
    Close,
    Tool(Tool),
    Color(SerializableColor),
    Size(f64),
    /// Pointer pressed
    Down(Point),
    /// Pointer moved, with modifiers held
    Move(Point, Modifiers),
    /// Pointer released
    Up(Point),
    /// Upload an image file
    Image(PathBuf),
    Clear,
    Grid,
    /// List scene objects
    List,
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("Empty command")]
    Empty,
    #[error("Unknown command: {0} (try 'help')")]
    Unknown(String),
    #[error("Missing argument for '{command}': {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
    #[error(transparent)]
    Tool(#[from] UnknownTool),
    #[error(transparent)]
    Color(#[from] ColorParseError),
}

/// Help entry for one command.
#[derive(Debug, Clone)]
pub struct CommandHelp {
    pub usage: &'static str,
    pub description: &'static str,
}

impl CommandHelp {
    pub const fn new(usage: &'static str, description: &'static str) -> Self {
        Self { usage, description }
    }
}

/// All commands, in help order.
pub const COMMANDS: &[CommandHelp] = &[
    CommandHelp::new("id", "Show your peer ID"),
    CommandHelp::new("connect <peer>", "Connect to a peer by ID"),
    CommandHelp::new("close", "Close the current connection"),
    CommandHelp::new("tool <name>", "pencil, eraser, line, rect, circle, triangle"),
    CommandHelp::new("color <#rrggbb>", "Set the pen color"),
    CommandHelp::new("size <n>", "Set the pen size"),
    CommandHelp::new("down <x> <y>", "Press the pointer"),
    CommandHelp::new("move <x> <y> [shift]", "Move the pointer"),
    CommandHelp::new("up <x> <y>", "Release the pointer"),
    CommandHelp::new("image <path>", "Upload an image file"),
    CommandHelp::new("clear", "Clear the scene for both peers"),
    CommandHelp::new("grid", "Toggle the grid overlay"),
    CommandHelp::new("list", "List scene objects"),
    CommandHelp::new("status", "Show connection status"),
    CommandHelp::new("help", "Show this help"),
    CommandHelp::new("quit", "Exit"),
];

/// Format the help table.
pub fn help_text() -> String {
    let mut text = String::from("Commands:\n");
    for entry in COMMANDS {
        text.push_str(&format!("  {:24} {}\n", entry.usage, entry.description));
    }
    text
}

fn number(arg: Option<&str>, command: &'static str, argument: &'static str) -> Result<f64, CommandError> {
    let arg = arg.ok_or(CommandError::MissingArgument { command, argument })?;
    arg.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| CommandError::InvalidNumber(arg.to_string()))
}

fn point<'a>(args: &mut impl Iterator<Item = &'a str>, command: &'static str) -> Result<Point, CommandError> {
    let x = number(args.next(), command, "x")?;
    let y = number(args.next(), command, "y")?;
    Ok(Point::new(x, y))
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or(CommandError::Empty)?;

        let command = match name.to_ascii_lowercase().as_str() {
            "id" => Command::Id,
            "connect" => {
                let peer = words.next().ok_or(CommandError::MissingArgument {
                    command: "connect",
                    argument: "peer",
                })?;
                Command::Connect(peer.to_string())
            }
            "close" => Command::Close,
            "tool" => {
                let tool = words.next().ok_or(CommandError::MissingArgument {
                    command: "tool",
                    argument: "name",
                })?;
                Command::Tool(tool.parse()?)
            }
            "color" => {
                let color = words.next().ok_or(CommandError::MissingArgument {
                    command: "color",
                    argument: "#rrggbb",
                })?;
                Command::Color(color.parse()?)
            }
            "size" => Command::Size(number(words.next(), "size", "n")?),
            "down" => Command::Down(point(&mut words, "down")?),
            "move" => {
                let at = point(&mut words, "move")?;
                let modifiers = match words.next() {
                    Some(word) if word.eq_ignore_ascii_case("shift") => Modifiers::shift(),
                    _ => Modifiers::default(),
                };
                Command::Move(at, modifiers)
            }
            "up" => Command::Up(point(&mut words, "up")?),
            "image" => {
                // Paths may contain spaces
                let path = line.trim_start()[name.len()..].trim();
                if path.is_empty() {
                    return Err(CommandError::MissingArgument {
                        command: "image",
                        argument: "path",
                    });
                }
                Command::Image(PathBuf::from(path))
            }
            "clear" => Command::Clear,
            "grid" => Command::Grid,
            "list" | "ls" => Command::List,
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!("id".parse(), Ok(Command::Id));
        assert_eq!("  QUIT ".parse(), Ok(Command::Quit));
        assert_eq!("connect 3f2a9c1e".parse(), Ok(Command::Connect("3f2a9c1e".to_string())));
        assert_eq!("tool circle".parse(), Ok(Command::Tool(Tool::Circle)));
        assert_eq!("size 12".parse(), Ok(Command::Size(12.0)));
        assert_eq!(
            "color #ff0000".parse(),
            Ok(Command::Color(SerializableColor::new(255, 0, 0, 255)))
        );
    }

    #[test]
    fn test_parse_pointer_commands() {
        assert_eq!("down 10 20".parse(), Ok(Command::Down(Point::new(10.0, 20.0))));
        assert_eq!(
            "move 1.5 2 shift".parse(),
            Ok(Command::Move(Point::new(1.5, 2.0), Modifiers::shift()))
        );
        assert_eq!(
            "move 1 2".parse(),
            Ok(Command::Move(Point::new(1.0, 2.0), Modifiers::default()))
        );
        assert_eq!("up 0 0".parse(), Ok(Command::Up(Point::ZERO)));
    }

    #[test]
    fn test_image_path_keeps_spaces() {
        assert_eq!(
            "image  my pictures/cat.png ".parse(),
            Ok(Command::Image(PathBuf::from("my pictures/cat.png")))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<Command>(), Err(CommandError::Empty));
        assert!(matches!("jump".parse::<Command>(), Err(CommandError::Unknown(_))));
        assert!(matches!(
            "down 10".parse::<Command>(),
            Err(CommandError::MissingArgument { argument: "y", .. })
        ));
        assert_eq!("size big".parse::<Command>(), Err(CommandError::InvalidNumber("big".to_string())));
        assert!(matches!("size NaN".parse::<Command>(), Err(CommandError::InvalidNumber(_))));
        assert!(matches!("tool lasso".parse::<Command>(), Err(CommandError::Tool(_))));
        assert!(matches!("color red".parse::<Command>(), Err(CommandError::Color(_))));
    }

    #[test]
    fn test_help_lists_every_command() {
        let help = help_text();
        for entry in COMMANDS {
            assert!(help.contains(entry.usage));
        }
    }
}
