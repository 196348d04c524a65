//! Line-oriented scanning: directive recognition and inline splices.

/// The closed set of directive keywords. A line whose `@word` is not one of
/// these is an ordinary text line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Set,
    Macro,
    EndMacro,
    End,
    If,
    ElseIf,
    Else,
    EndIf,
    Error,
    Include,
}

impl Keyword {
    pub fn recognize(name: &str) -> Option<Keyword> {
        Some(match name {
            "set" => Keyword::Set,
            "macro" => Keyword::Macro,
            "endmacro" => Keyword::EndMacro,
            "end" => Keyword::End,
            "if" => Keyword::If,
            "elseif" => Keyword::ElseIf,
            "else" => Keyword::Else,
            "endif" => Keyword::EndIf,
            "error" => Keyword::Error,
            "include" => Keyword::Include,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Keyword::Set => "@set",
            Keyword::Macro => "@macro",
            Keyword::EndMacro => "@endmacro",
            Keyword::End => "@end",
            Keyword::If => "@if",
            Keyword::ElseIf => "@elseif",
            Keyword::Else => "@else",
            Keyword::EndIf => "@endif",
            Keyword::Error => "@error",
            Keyword::Include => "@include",
        }
    }
}

/// Classification of one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// `@keyword args`. `args` has had comments stripped and surrounding
    /// whitespace trimmed; for the parenthesized form `@keyword(args)` the
    /// outer parentheses are removed.
    Directive { keyword: Keyword, args: String },
    Text,
}

/// Classifies a line as a directive or text.
///
/// A directive line matches `^\s*@<keyword>` followed by nothing, whitespace
/// plus arguments, or a parenthesized argument list directly after the
/// keyword. Anything else - including `@word`s outside the keyword set and
/// malformed parenthesized forms - is text.
pub fn classify(line: &str) -> LineKind {
    let trimmed = line.trim_start();
    let Some(rest) = trimmed.strip_prefix('@') else {
        return LineKind::Text;
    };

    let name_len = rest
        .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .unwrap_or(rest.len());
    let Some(keyword) = Keyword::recognize(&rest[..name_len]) else {
        return LineKind::Text;
    };

    let after_name = &rest[name_len..];
    match after_name.chars().next() {
        None => LineKind::Directive {
            keyword,
            args: String::new(),
        },
        Some('(') => match parenthesized_args(after_name) {
            Some(args) => LineKind::Directive {
                keyword,
                args: strip_comments(args).trim().to_owned(),
            },
            None => LineKind::Text,
        },
        Some(c) if c.is_whitespace() => LineKind::Directive {
            keyword,
            args: strip_comments(after_name).trim().to_owned(),
        },
        Some(_) => LineKind::Text,
    }
}

/// Extracts the contents of `(...)` when the parentheses balance and nothing
/// but whitespace or a comment follows the closing one.
fn parenthesized_args(input: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut string_quote = None;
    let mut escaped = false;
    for (index, char) in input.char_indices() {
        if let Some(quote) = string_quote {
            if escaped {
                escaped = false;
            } else if char == '\\' {
                escaped = true;
            } else if char == quote {
                string_quote = None;
            }
            continue;
        }
        match char {
            '\'' | '"' => string_quote = Some(char),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    let trailing = strip_comments(&input[index + 1..]);
                    if trailing.trim().is_empty() {
                        return Some(&input[1..index]);
                    }
                    return None;
                }
            }
            _ => (),
        }
    }
    None
}

/// Strips `// ...` and single-line `/* ... */` comments from a directive
/// argument region. String literals are respected; text lines never go
/// through here.
pub fn strip_comments(args: &str) -> String {
    let mut result = String::with_capacity(args.len());
    let mut string_quote = None;
    let mut escaped = false;
    let mut chars = args.char_indices().peekable();
    while let Some((index, char)) = chars.next() {
        if let Some(quote) = string_quote {
            if escaped {
                escaped = false;
            } else if char == '\\' {
                escaped = true;
            } else if char == quote {
                string_quote = None;
            }
            result.push(char);
            continue;
        }
        match char {
            '\'' | '"' => {
                string_quote = Some(char);
                result.push(char);
            }
            '/' => match chars.peek().map(|&(_, c)| c) {
                Some('/') => break,
                Some('*') => {
                    chars.next();
                    match args[index + 2..].find("*/") {
                        Some(close) => {
                            // Skip ahead past the terminator.
                            let resume = index + 2 + close + 2;
                            while chars.next_if(|&(i, _)| i < resume).is_some() {}
                        }
                        None => break,
                    }
                }
                _ => result.push(char),
            },
            _ => result.push(char),
        }
    }
    result
}

/// One piece of a text line: literal text, or an `@{...}` splice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Splice {
        expr: &'a str,
        /// 1-based column of the `@` that opens the splice.
        column: u32,
    },
}

/// An unterminated `@{` splice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpliceError {
    pub column: u32,
}

/// Splits a text line into literal segments and inline expression splices.
///
/// The closing brace is matched nest-sensitively: braces inside the splice
/// increase the depth, and string literals suppress counting.
pub fn scan_splices(line: &str) -> Result<Vec<Segment<'_>>, SpliceError> {
    let mut segments = vec![];
    let mut cursor = 0;
    while let Some(offset) = line[cursor..].find("@{") {
        let at = cursor + offset;
        if at > cursor {
            segments.push(Segment::Text(&line[cursor..at]));
        }
        let column = column_of(line, at);

        let expr_start = at + 2;
        let mut depth = 1usize;
        let mut string_quote = None;
        let mut escaped = false;
        let mut close = None;
        for (index, char) in line[expr_start..].char_indices() {
            if let Some(quote) = string_quote {
                if escaped {
                    escaped = false;
                } else if char == '\\' {
                    escaped = true;
                } else if char == quote {
                    string_quote = None;
                }
                continue;
            }
            match char {
                '\'' | '"' => string_quote = Some(char),
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(expr_start + index);
                        break;
                    }
                }
                _ => (),
            }
        }
        let Some(close) = close else {
            return Err(SpliceError { column });
        };
        segments.push(Segment::Splice {
            expr: &line[expr_start..close],
            column,
        });
        cursor = close + 1;
    }
    if cursor < line.len() {
        segments.push(Segment::Text(&line[cursor..]));
    }
    Ok(segments)
}

fn column_of(line: &str, byte_index: usize) -> u32 {
    line[..byte_index].chars().count() as u32 + 1
}
