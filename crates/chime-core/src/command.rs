//! Command grammar
//!
//! ```text
//! play <file> [channel]
//! loop <file> [channel]
//! stop <channel>
//! silence [channel]
//! exit
//! ```
//!
//! Tokens are whitespace separated; extra tokens are ignored. Channel tokens
//! are case-folded and must be exactly one character.

use crate::clip::ChannelId;
use crate::error::CommandError;

/// A parsed instruction for the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Play (or loop) a file on a channel, preempting whatever it holds
    Play {
        /// File token, not yet alias-expanded or resolved
        file: String,
        /// `None` selects the default channel
        channel: Option<ChannelId>,
        looping: bool,
    },
    /// Kill the running clip, leave pending ones alone
    Stop { channel: ChannelId },
    /// Kill the running clip and drop pending ones; all channels if `None`
    Silence { channel: Option<ChannelId> },
    /// Orderly shutdown
    Exit,
}

impl Command {
    /// Parse one raw input line
    ///
    /// Returns `Ok(None)` for blank lines.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            return Ok(None);
        };

        let command = match keyword {
            "play" | "loop" => {
                let file = parts.next().ok_or(CommandError::MissingFile)?;
                let channel = parts.next().map(ChannelId::parse).transpose()?;
                Self::Play {
                    file: file.to_string(),
                    channel,
                    looping: keyword == "loop",
                }
            }
            "stop" => {
                let token = parts.next().ok_or(CommandError::MissingChannel)?;
                Self::Stop {
                    channel: ChannelId::parse(token)?,
                }
            }
            "silence" => Self::Silence {
                channel: parts.next().map(ChannelId::parse).transpose()?,
            },
            "exit" => Self::Exit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };

        Ok(Some(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(c: char) -> Option<ChannelId> {
        Some(ChannelId::new(c))
    }

    #[test]
    fn test_parse_play_and_loop() {
        assert_eq!(
            Command::parse("play chime.wav").unwrap(),
            Some(Command::Play {
                file: "chime.wav".to_string(),
                channel: None,
                looping: false,
            })
        );
        assert_eq!(
            Command::parse("  loop alarm.wav B\r\n").unwrap(),
            Some(Command::Play {
                file: "alarm.wav".to_string(),
                channel: ch('b'),
                looping: true,
            })
        );
    }

    #[test]
    fn test_parse_stop_and_silence() {
        assert_eq!(
            Command::parse("stop a").unwrap(),
            Some(Command::Stop {
                channel: ChannelId::new('a')
            })
        );
        assert_eq!(
            Command::parse("silence").unwrap(),
            Some(Command::Silence { channel: None })
        );
        assert_eq!(
            Command::parse("silence C").unwrap(),
            Some(Command::Silence { channel: ch('c') })
        );
        assert_eq!(Command::parse("exit").unwrap(), Some(Command::Exit));
    }

    #[test]
    fn test_parse_blank() {
        assert_eq!(Command::parse("").unwrap(), None);
        assert_eq!(Command::parse(" \t\n").unwrap(), None);
    }

    #[test]
    fn test_parse_rejections() {
        assert_eq!(Command::parse("play"), Err(CommandError::MissingFile));
        assert_eq!(
            Command::parse("play x ab"),
            Err(CommandError::InvalidChannel("ab".to_string()))
        );
        assert_eq!(Command::parse("stop"), Err(CommandError::MissingChannel));
        assert_eq!(
            Command::parse("silence xy"),
            Err(CommandError::InvalidChannel("xy".to_string()))
        );
        assert_eq!(
            Command::parse("dance a"),
            Err(CommandError::Unknown("dance".to_string()))
        );
    }

    #[test]
    fn test_parse_ignores_extra_tokens() {
        assert_eq!(
            Command::parse("stop a b c").unwrap(),
            Some(Command::Stop {
                channel: ChannelId::new('a')
            })
        );
    }
}
