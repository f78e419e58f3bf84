//! Lenient HTML tokenizer.
//!
//! Streams start tags, end tags, and text out of arbitrary real-world
//! markup. There is no error state: comments, doctypes, and processing
//! instructions are skipped, a stray `<` that opens nothing becomes text,
//! and unterminated constructs run to end of input. Character references in
//! text and attribute values are decoded.

/// One tokenizer event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    StartTag {
        /// Lowercase tag name.
        name: String,
        /// Attribute names lowercased, values decoded verbatim.
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    EndTag {
        name: String,
    },
    Text(String),
}

/// Tag names whose content is raw text up to the matching end tag.
const RAW_TEXT_TAGS: &[&str] = &["script", "style", "xmp"];

pub struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    /// Set after a raw-text start tag; cleared at its end tag.
    raw_text_until: Option<&'static str>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            raw_text_until: None,
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn next_token(&mut self) -> Option<Token> {
        if self.pos >= self.input.len() {
            return None;
        }

        if let Some(tag) = self.raw_text_until {
            return match self.raw_text(tag) {
                // Empty element content, e.g. <style></style>.
                Token::Text(text) if text.is_empty() => self.next_token(),
                token => Some(token),
            };
        }

        let rest = self.rest();
        if let Some(stripped) = rest.strip_prefix('<') {
            let mut chars = stripped.chars();
            match chars.next() {
                Some('!') => {
                    self.skip_markup_declaration();
                    self.next_token()
                }
                Some('?') => {
                    self.skip_until('>');
                    self.next_token()
                }
                Some('/') => self.end_tag(),
                Some(c) if c.is_ascii_alphabetic() => self.start_tag(),
                // A lone '<' is content, not markup.
                _ => {
                    self.pos += 1;
                    Some(Token::Text("<".to_string()))
                }
            }
        } else {
            let end = rest.find('<').unwrap_or(rest.len());
            let text = &rest[..end];
            self.pos += end;
            Some(Token::Text(decode_entities(text)))
        }
    }

    /// Consume raw content up to `</tag` and emit it as text.
    fn raw_text(&mut self, tag: &'static str) -> Token {
        let rest = self.rest();
        let lower = rest.to_ascii_lowercase();
        let closer = format!("</{tag}");
        match lower.find(&closer) {
            Some(at) => {
                let text = &rest[..at];
                self.pos += at;
                self.raw_text_until = None;
                Token::Text(text.to_string())
            }
            None => {
                self.pos = self.input.len();
                self.raw_text_until = None;
                Token::Text(rest.to_string())
            }
        }
    }

    /// Skip `<!...>`: comments honor `-->`, everything else a bare `>`.
    fn skip_markup_declaration(&mut self) {
        let rest = self.rest();
        if rest.starts_with("<!--") {
            match rest[4..].find("-->") {
                Some(at) => self.pos += 4 + at + 3,
                None => self.pos = self.input.len(),
            }
        } else {
            self.skip_until('>');
        }
    }

    fn skip_until(&mut self, delimiter: char) {
        match self.rest().find(delimiter) {
            Some(at) => self.pos += at + 1,
            None => self.pos = self.input.len(),
        }
    }

    fn end_tag(&mut self) -> Option<Token> {
        // Past "</".
        self.pos += 2;
        let rest = self.rest();
        let name_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        let name = rest[..name_len].to_ascii_lowercase();
        self.pos += name_len;
        self.skip_until('>');
        if name.is_empty() {
            return self.next_token();
        }
        Some(Token::EndTag { name })
    }

    fn start_tag(&mut self) -> Option<Token> {
        // Past "<".
        self.pos += 1;
        let rest = self.rest();
        let name_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        let name = rest[..name_len].to_ascii_lowercase();
        self.pos += name_len;

        let mut attrs = Vec::new();
        let mut self_closing = false;

        loop {
            self.skip_whitespace();
            let rest = self.rest();
            let Some(c) = rest.chars().next() else { break };
            match c {
                '>' => {
                    self.pos += 1;
                    break;
                }
                '/' => {
                    self.pos += 1;
                    if self.rest().starts_with('>') {
                        self.pos += 1;
                        self_closing = true;
                        break;
                    }
                }
                _ => {
                    if let Some(attr) = self.attribute() {
                        attrs.push(attr);
                    }
                }
            }
        }

        if RAW_TEXT_TAGS.contains(&name.as_str()) && !self_closing {
            self.raw_text_until = RAW_TEXT_TAGS
                .iter()
                .find(|&&t| t == name)
                .copied();
        }

        Some(Token::StartTag {
            name,
            attrs,
            self_closing,
        })
    }

    /// One `name`, `name=value`, or `name="value"` attribute.
    fn attribute(&mut self) -> Option<(String, String)> {
        let rest = self.rest();
        let name_len = rest
            .find(|c: char| c.is_ascii_whitespace() || c == '=' || c == '>' || c == '/')
            .unwrap_or(rest.len());
        if name_len == 0 {
            // Stray character; step over it so the loop advances.
            self.pos += rest.chars().next().map_or(0, |c| c.len_utf8());
            return None;
        }
        let name = rest[..name_len].to_ascii_lowercase();
        self.pos += name_len;

        self.skip_whitespace();
        if !self.rest().starts_with('=') {
            // Boolean attribute.
            return Some((name, String::new()));
        }
        self.pos += 1;
        self.skip_whitespace();

        let rest = self.rest();
        let value = match rest.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let value_start = 1;
                match rest[value_start..].find(quote) {
                    Some(at) => {
                        let value = &rest[value_start..value_start + at];
                        self.pos += value_start + at + 1;
                        value
                    }
                    None => {
                        let value = &rest[value_start..];
                        self.pos = self.input.len();
                        value
                    }
                }
            }
            _ => {
                let end = rest
                    .find(|c: char| c.is_ascii_whitespace() || c == '>')
                    .unwrap_or(rest.len());
                let value = &rest[..end];
                self.pos += end;
                value
            }
        };

        Some((name, decode_entities(value)))
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        let skipped = rest.len() - rest.trim_start().len();
        self.pos += skipped;
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        self.next_token()
    }
}

/// Decode character references: the common named set plus numeric forms.
/// Unknown references pass through untouched.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(at) = rest.find('&') {
        out.push_str(&rest[..at]);
        rest = &rest[at..];
        match parse_entity(rest) {
            Some((decoded, consumed)) => {
                out.push_str(&decoded);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Decode one `&...;` reference at the start of `text`.
fn parse_entity(text: &str) -> Option<(String, usize)> {
    let semicolon = text[1..].find(';')? + 1;
    // Entity names are short; a distant semicolon means this '&' is literal.
    if semicolon > 12 {
        return None;
    }
    let body = &text[1..semicolon];
    let decoded = if let Some(number) = body.strip_prefix('#') {
        let code = if let Some(hex) = number.strip_prefix(['x', 'X']) {
            u32::from_str_radix(hex, 16).ok()?
        } else {
            number.parse().ok()?
        };
        char::from_u32(code)?.to_string()
    } else {
        match body {
            "amp" => "&".to_string(),
            "lt" => "<".to_string(),
            "gt" => ">".to_string(),
            "quot" => "\"".to_string(),
            "apos" => "'".to_string(),
            "nbsp" => "\u{a0}".to_string(),
            _ => return None,
        }
    };
    Some((decoded, semicolon + 1))
}
