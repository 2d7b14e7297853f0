//! Markup Lexer
//!
//! Splits raw markup into a flat token sequence without judging
//! structure. Recovery decisions that belong at the token level happen
//! here: an unterminated tag (`<` with no closing `>`) degrades to
//! literal text, comments and doctype/processing noise are dropped.

// =============================================================================
// Tokens
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Token {
    StartTag {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    EndTag {
        name: String,
    },
    Text(String),
}

// =============================================================================
// Lexer
// =============================================================================

pub(super) struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub(super) fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    pub(super) fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token() {
            // Merge adjacent text runs so recovery never fragments text
            if let (Token::Text(tail), Some(Token::Text(prev))) = (&token, tokens.last_mut()) {
                prev.push_str(tail);
                continue;
            }
            tokens.push(token);
        }
        tokens
    }

    fn rest(&self) -> &str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn next_token(&mut self) -> Option<Token> {
        if self.pos >= self.input.len() {
            return None;
        }

        if self.peek() == Some('<') {
            let mark = self.pos;
            if let Some(token) = self.lex_angle() {
                return Some(token);
            }
            // Not a recognizable tag: the '<' is literal text
            self.pos = mark;
            self.bump();
            return Some(Token::Text("<".to_string()));
        }

        Some(Token::Text(self.take_text()))
    }

    fn take_text(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '<' {
                break;
            }
            self.bump();
        }
        self.input[start..self.pos].to_string()
    }

    /// Lex from a `<`. Returns `None` when the remainder is not a tag,
    /// leaving position handling to the caller.
    fn lex_angle(&mut self) -> Option<Token> {
        self.bump(); // '<'

        match self.peek()? {
            '/' => {
                self.bump();
                self.lex_end_tag()
            }
            '!' | '?' => {
                self.skip_declaration();
                // Declarations produce no token; recurse for the next one
                self.next_token()
            }
            c if c.is_ascii_alphabetic() => self.lex_start_tag(),
            _ => None,
        }
    }

    fn lex_start_tag(&mut self) -> Option<Token> {
        let name = self.take_name();
        let mut attrs = Vec::new();

        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('>') => {
                    self.bump();
                    return Some(Token::StartTag {
                        name,
                        attrs,
                        self_closing: false,
                    });
                }
                Some('/') => {
                    self.bump();
                    self.skip_whitespace();
                    if self.peek() == Some('>') {
                        self.bump();
                        return Some(Token::StartTag {
                            name,
                            attrs,
                            self_closing: true,
                        });
                    }
                    // Stray '/' inside a tag, skip it
                }
                Some(_) => {
                    if let Some(attr) = self.lex_attr() {
                        attrs.push(attr);
                    }
                }
                // Unterminated tag at EOF degrades to text
                None => return None,
            }
        }
    }

    fn lex_end_tag(&mut self) -> Option<Token> {
        let name = self.take_name();
        if name.is_empty() {
            return None;
        }
        loop {
            match self.bump() {
                Some('>') => return Some(Token::EndTag { name }),
                Some(_) => {}
                None => return None,
            }
        }
    }

    fn lex_attr(&mut self) -> Option<(String, String)> {
        let name = self.take_attr_name();
        if name.is_empty() {
            // Unrecognized byte inside the tag, consume and move on
            self.bump();
            return None;
        }
        self.skip_whitespace();
        if self.peek() != Some('=') {
            return Some((name, String::new()));
        }
        self.bump();
        self.skip_whitespace();
        Some((name, self.take_attr_value()))
    }

    fn take_attr_value(&mut self) -> String {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.bump();
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if c == quote {
                        break;
                    }
                    self.bump();
                }
                let value = self.input[start..self.pos].to_string();
                self.bump(); // closing quote, if any
                value
            }
            _ => {
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if c.is_whitespace() || c == '>' || c == '/' {
                        break;
                    }
                    self.bump();
                }
                self.input[start..self.pos].to_string()
            }
        }
    }

    fn take_name(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_ascii_lowercase()
    }

    fn take_attr_name(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':' || c == '@' {
                self.bump();
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_ascii_lowercase()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    /// Skip `<!-- -->` comments and `<!...>` / `<?...>` declarations
    fn skip_declaration(&mut self) {
        if self.rest().starts_with("!--") {
            self.pos += 3;
            match self.rest().find("-->") {
                Some(end) => self.pos += end + 3,
                None => self.pos = self.input.len(),
            }
            return;
        }
        loop {
            match self.bump() {
                Some('>') | None => break,
                Some(_) => {}
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
