//! Lexer: converts source text into a token sequence terminated by [`TokenKind::End`].

use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::source::{SourceId, SourceStore};
use crate::token::{Location, PunctuatorKind, Token, TokenKind};

/// Lexes file `file` out of `store`, reporting the first unrecognized byte
/// (if any) to `sink` and returning whatever tokens were produced up to
/// that point plus a trailing `End` token, so the driver can refuse to
/// continue (spec.md 4.1).
pub fn lex(store: &SourceStore, file: SourceId, sink: &mut dyn DiagnosticSink) -> Vec<Token> {
    let source = store.get(file);
    // Comment bytes are overwritten with spaces in a scratch buffer so
    // offsets/lengths computed later still point at the original text.
    let mut buf = source.text.clone().into_bytes();
    blank_comments(&mut buf);
    let text = std::str::from_utf8(&buf).expect("comment-blanking preserves UTF-8 validity");

    let mut tokens = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0usize;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let start = i;
        let line = source.line_at(start);

        if c.is_ascii_digit() {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            if j < bytes.len() && bytes[j] == b'u' {
                let text_slice = &text[start..j];
                tokens.push(Token {
                    kind: TokenKind::USize,
                    text: text_slice.to_string(),
                    loc: Location { file, offset: start, length: j + 1 - start, line },
                    punct: None,
                });
                i = j + 1;
                continue;
            }
            if j < bytes.len() && bytes[j] == b'.' && j + 1 < bytes.len() && bytes[j + 1].is_ascii_digit() {
                let mut k = j + 1;
                while k < bytes.len() && bytes[k].is_ascii_digit() {
                    k += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Float,
                    text: text[start..k].to_string(),
                    loc: Location { file, offset: start, length: k - start, line },
                    punct: None,
                });
                i = k;
                continue;
            }
            tokens.push(Token {
                kind: TokenKind::Int,
                text: text[start..j].to_string(),
                loc: Location { file, offset: start, length: j - start, line },
                punct: None,
            });
            i = j;
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            let mut j = i + 1;
            while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
                j += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Identifier,
                text: text[start..j].to_string(),
                loc: Location { file, offset: start, length: j - start, line },
                punct: None,
            });
            i = j;
            continue;
        }

        if c == b'"' {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j] != b'"' {
                j += 1;
            }
            let end = (j + 1).min(bytes.len());
            tokens.push(Token {
                kind: TokenKind::String,
                text: text[i + 1..j.min(bytes.len())].to_string(),
                loc: Location { file, offset: start, length: end - start, line },
                punct: None,
            });
            i = end;
            continue;
        }

        if let Some((punct_text, kind)) = match_punctuator(&text[i..]) {
            tokens.push(Token {
                kind: TokenKind::Punctuator,
                text: punct_text.to_string(),
                loc: Location { file, offset: start, length: punct_text.len(), line },
                punct: Some(kind),
            });
            i += punct_text.len();
            continue;
        }

        sink.emit(Diagnostic::error(
            DiagnosticKind::InvalidSyntax,
            Location { file, offset: start, length: 1, line },
            format!("unexpected character '{}'", c as char),
        ));
        return finish(tokens, file, source, bytes.len());
    }

    finish(tokens, file, source, bytes.len())
}

fn finish(mut tokens: Vec<Token>, file: SourceId, source: &crate::source::SourceFile, end_offset: usize) -> Vec<Token> {
    let line = source.line_at(end_offset.min(source.text.len()));
    tokens.push(Token {
        kind: TokenKind::End,
        text: String::new(),
        loc: Location { file, offset: end_offset, length: 0, line },
        punct: None,
    });
    tokens
}

fn match_punctuator(rest: &str) -> Option<(&'static str, PunctuatorKind)> {
    for &(text, kind) in PunctuatorKind::TABLE {
        if rest.starts_with(text) {
            return Some((text, kind));
        }
    }
    None
}

/// Overwrites `//` line comments and `/* ... */` block comments with spaces
/// (preserving newlines), so later byte-offset math stays accurate.
fn blank_comments(buf: &mut [u8]) {
    let mut i = 0;
    while i + 1 < buf.len() {
        if buf[i] == b'/' && buf[i + 1] == b'/' {
            let start = i;
            while i < buf.len() && buf[i] != b'\n' {
                i += 1;
            }
            for b in &mut buf[start..i] {
                *b = b' ';
            }
        } else if buf[i] == b'/' && buf[i + 1] == b'*' {
            let start = i;
            i += 2;
            while i + 1 < buf.len() && !(buf[i] == b'*' && buf[i + 1] == b'/') {
                i += 1;
            }
            let end = (i + 2).min(buf.len());
            for b in &mut buf[start..end] {
                if *b != b'\n' {
                    *b = b' ';
                }
            }
            i = end;
        } else {
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use pretty_assertions::assert_eq;

    fn lex_str(src: &str) -> Vec<Token> {
        let mut store = SourceStore::new();
        let id = store.add_file("t.metro", src.to_string());
        let mut sink = CollectingSink::new();
        lex(&store, id, &mut sink)
    }

    #[test]
    fn span_closure_holds_for_every_token() {
        let src = "let x: Int = (1 + 2u) * 3.5 - foo(\"hi\");";
        let mut store = SourceStore::new();
        let id = store.add_file("t.metro", src.to_string());
        let mut sink = CollectingSink::new();
        let tokens = lex(&store, id, &mut sink);
        for t in &tokens {
            if t.is_end() {
                continue;
            }
            let slice = &src[t.loc.offset..t.loc.offset + t.loc.length];
            if t.kind == TokenKind::String {
                assert_eq!(&slice[1..slice.len() - 1], t.text);
            } else {
                assert_eq!(slice, t.text);
            }
        }
    }

    #[test]
    fn recognizes_usize_and_float_suffixes() {
        let tokens = lex_str("42u 3.14 7");
        assert_eq!(tokens[0].kind, TokenKind::USize);
        assert_eq!(tokens[1].kind, TokenKind::Float);
        assert_eq!(tokens[2].kind, TokenKind::Int);
    }

    #[test]
    fn splits_shr_as_single_token_at_lex_time() {
        let tokens = lex_str(">>");
        assert_eq!(tokens[0].punct, Some(PunctuatorKind::Shr));
    }

    #[test]
    fn comments_are_skipped_and_offsets_stay_accurate() {
        let tokens = lex_str("1 /* c */ + // trailing\n2");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![TokenKind::Int, TokenKind::Punctuator, TokenKind::Int, TokenKind::End]
        );
    }

    #[test]
    fn unknown_byte_emits_diagnostic_and_truncates() {
        let mut store = SourceStore::new();
        let id = store.add_file("t.metro", "1 @ 2".to_string());
        let mut sink = CollectingSink::new();
        let tokens = lex(&store, id, &mut sink);
        assert!(sink.has_errors());
        assert_eq!(tokens.last().unwrap().kind, TokenKind::End);
    }

    proptest::proptest! {
        /// spec.md 8 property 1: for every non-`End` token, `source[offset..offset+length]`
        /// equals `text` (modulo the surrounding quotes a `String` token's span
        /// includes but `text` does not). Holds for arbitrary printable-ASCII
        /// input, not just well-formed programs.
        #[test]
        fn span_closure_holds_for_arbitrary_source(src in "[ -~\n\t]{0,80}") {
            let tokens = lex_str(&src);
            for t in &tokens {
                if t.is_end() {
                    continue;
                }
                let slice = &src[t.loc.offset..t.loc.offset + t.loc.length];
                if t.kind == TokenKind::String {
                    proptest::prop_assert_eq!(&slice[1..slice.len() - 1], t.text.as_str());
                } else {
                    proptest::prop_assert_eq!(slice, t.text.as_str());
                }
            }
        }
    }
}
