//! Plain-text signature database parser.
//!
//! Tokens are whitespace separated and may span any number of lines:
//!
//! ```text
//! Player_One
//! 78 A9 00 ?? 8D end
//! A2 ?? and BD ?? ?? 9D END
//! Player_Two 20 ?? ?? 4C end
//! ```
//!
//! `??` is a wildcard, `and`/`end` are case-insensitive operators, any
//! two-hex-digit token is a literal byte and everything else is a player
//! name. A name that appears while a pattern is still open is an error.

use super::pattern::{Matcher, SignaturePattern};
use super::PlayerSignature;
use crate::error::{ConvertError, Result};

enum Token<'a> {
    Matcher(Matcher),
    Name(&'a str),
}

fn classify(token: &str) -> Token<'_> {
    if token == "??" {
        return Token::Matcher(Matcher::Any);
    }
    if token.eq_ignore_ascii_case("and") {
        return Token::Matcher(Matcher::And);
    }
    if token.eq_ignore_ascii_case("end") {
        return Token::Matcher(Matcher::End);
    }
    if token.len() == 2 && token.bytes().all(|b| b.is_ascii_hexdigit()) {
        if let Ok(value) = u8::from_str_radix(token, 16) {
            return Token::Matcher(Matcher::Byte(value));
        }
    }
    Token::Name(token)
}

/// Parse a signature database into player signatures, in file order.
pub fn parse_signatures(text: &str) -> Result<Vec<PlayerSignature>> {
    let mut players: Vec<PlayerSignature> = Vec::new();
    let mut pending: Vec<Matcher> = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        for token in line.split_whitespace() {
            match classify(token) {
                Token::Name(name) => {
                    if !pending.is_empty() {
                        return Err(ConvertError::SignatureParse {
                            line: line_no + 1,
                            token: token.to_string(),
                            message: "player name inside an unterminated pattern".to_string(),
                        });
                    }
                    players.push(PlayerSignature::new(name));
                }
                Token::Matcher(matcher) => {
                    let Some(player) = players.last_mut() else {
                        return Err(ConvertError::SignatureParse {
                            line: line_no + 1,
                            token: token.to_string(),
                            message: "pattern before any player name".to_string(),
                        });
                    };
                    pending.push(matcher);
                    if matcher == Matcher::End {
                        player
                            .patterns
                            .push(SignaturePattern::new(std::mem::take(&mut pending)));
                    }
                }
            }
        }
    }

    if !pending.is_empty() {
        let line = text.lines().count();
        return Err(ConvertError::SignatureParse {
            line,
            token: String::new(),
            message: "unterminated pattern at end of input".to_string(),
        });
    }

    Ok(players)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_multi_line_player() {
        let players = parse_signatures(
            "Player_One\n78 A9 00 ?? 8D end\nA2 ?? and BD END\nPlayer_Two 20 4C end\n",
        )
        .unwrap();
        assert_eq!(players.len(), 2);
        assert_eq!(players[0].name, "Player_One");
        assert_eq!(players[0].patterns.len(), 2);
        assert_eq!(
            players[0].patterns[1].matchers(),
            &[
                Matcher::Byte(0xA2),
                Matcher::Any,
                Matcher::And,
                Matcher::Byte(0xBD),
                Matcher::End
            ]
        );
        assert_eq!(players[1].name, "Player_Two");
        assert_eq!(players[1].patterns.len(), 1);
    }

    #[test]
    fn test_name_inside_pattern_is_error() {
        let err = parse_signatures("Alpha 78 A9\nBeta 20 end").unwrap_err();
        match err {
            ConvertError::SignatureParse { line, token, .. } => {
                assert_eq!(line, 2);
                assert_eq!(token, "Beta");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bytes_before_name_is_error() {
        assert!(parse_signatures("78 A9 end").is_err());
    }

    #[test]
    fn test_unterminated_pattern_is_error() {
        assert!(parse_signatures("Alpha 78 A9").is_err());
    }

    #[test]
    fn test_consecutive_names_are_allowed() {
        let players = parse_signatures("Alpha\nBeta 10 end").unwrap();
        assert_eq!(players.len(), 2);
        assert!(players[0].patterns.is_empty());
    }

    #[test]
    fn test_operators_are_case_insensitive() {
        let players = parse_signatures("Alpha 10 AnD 20 EnD").unwrap();
        assert_eq!(players[0].patterns[0].matchers()[1], Matcher::And);
    }
}
