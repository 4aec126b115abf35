//! Terminal output sanitizing.
//!
//! FortiOS consoles may decorate output with escape sequences and CRLF line
//! endings. The parser only ever sees plain `\n`-separated text.

use vte::{Parser, Perform};

/// Collects printable characters and the whitespace controls we keep.
#[derive(Default)]
struct PlainText {
    out: String,
}

impl Perform for PlainText {
    fn print(&mut self, c: char) {
        self.out.push(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' => self.out.push('\n'),
            b'\t' => self.out.push('\t'),
            // \r, bell, backspace and friends carry no content
            _ => {}
        }
    }
}

/// Strip escape sequences and carriage returns from raw console bytes.
pub fn sanitize(raw: &[u8]) -> String {
    let mut parser = Parser::new();
    let mut text = PlainText::default();
    parser.advance(&mut text, raw);
    text.out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(sanitize(b"edit \"ELS-a\"\n    next\n"), "edit \"ELS-a\"\n    next\n");
    }

    #[test]
    fn test_crlf_is_normalized() {
        assert_eq!(sanitize(b"config firewall address\r\nend\r\n"), "config firewall address\nend\n");
    }

    #[test]
    fn test_ansi_stripping() {
        assert_eq!(sanitize(b"\x1b[32mGreen text\x1b[0m"), "Green text");
    }
}
