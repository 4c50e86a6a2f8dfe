//! Raw datagram framing: split a payload into a command line and an
//! optional multiline body at the first newline.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command_line: String,
    pub body: Option<String>,
}

impl Frame {
    /// Parse a raw datagram payload. Invalid UTF-8 is lossily converted
    /// rather than rejected outright — a malformed frame still needs a
    /// single reply, and `verb()` will simply fail to match any known verb.
    pub fn parse(payload: &[u8]) -> Self {
        let text = String::from_utf8_lossy(payload);
        match text.split_once('\n') {
            Some((line, rest)) => Frame {
                command_line: line.to_string(),
                body: Some(rest.to_string()),
            },
            None => Frame {
                command_line: text.to_string(),
                body: None,
            },
        }
    }

    /// The first whitespace-delimited token of the command line.
    pub fn verb(&self) -> &str {
        self.command_line
            .split_whitespace()
            .next()
            .unwrap_or("")
    }

    /// Everything after the verb on the command line, trimmed.
    pub fn args(&self) -> &str {
        match self.command_line.split_once(char::is_whitespace) {
            Some((_, rest)) => rest.trim(),
            None => "",
        }
    }

    pub fn body_or_empty(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_only() {
        let f = Frame::parse(b"LIST_FILES");
        assert_eq!(f.verb(), "LIST_FILES");
        assert_eq!(f.args(), "");
        assert_eq!(f.body, None);
    }

    #[test]
    fn parses_command_with_args() {
        let f = Frame::parse(b"CD ..");
        assert_eq!(f.verb(), "CD");
        assert_eq!(f.args(), "..");
    }

    #[test]
    fn parses_command_with_body() {
        let f = Frame::parse(b"SYNC_CHUNK 1/2\n{\"a\":1}");
        assert_eq!(f.verb(), "SYNC_CHUNK");
        assert_eq!(f.args(), "1/2");
        assert_eq!(f.body_or_empty(), "{\"a\":1}");
    }

    #[test]
    fn empty_payload_has_empty_verb() {
        let f = Frame::parse(b"");
        assert_eq!(f.verb(), "");
    }
}
