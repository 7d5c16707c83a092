//! Bourne-shell-style tokenization of option strings, on top of [`shlex`].
//!
//! Whitespace separates tokens. Single quotes keep everything literal; inside
//! double quotes a backslash escapes `$`, `` ` ``, `"` and `\` only; outside
//! quotes a backslash escapes any character. A `#` starting a word begins a
//! comment that runs to the end of the line.

use shlex::Shlex;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenizationError {
    #[error("backslash at end of string")]
    TrailingBackslash,

    #[error("unterminated quotation")]
    UnterminatedQuotation,
}

/// Append the tokens of `input` to `tokens`.
///
/// On error, tokens completed before the error are kept in `tokens`.
pub fn tokenize(tokens: &mut Vec<String>, input: &str) -> Result<(), TokenizationError> {
    let mut lexer = Shlex::new(input);
    tokens.extend(&mut lexer);
    if lexer.had_error {
        return Err(classify_error(input));
    }
    Ok(())
}

// Shlex only flags that the input was malformed. An odd run of trailing
// backslashes means the last escape had nothing to escape.
fn classify_error(input: &str) -> TokenizationError {
    let trailing = input.chars().rev().take_while(|&c| c == '\\').count();
    if trailing % 2 == 1 {
        TokenizationError::TrailingBackslash
    } else {
        TokenizationError::UnterminatedQuotation
    }
}

/// Tokenize `input` into a fresh list.
pub fn split(input: &str) -> Result<Vec<String>, TokenizationError> {
    let mut tokens = Vec::new();
    tokenize(&mut tokens, input)?;
    Ok(tokens)
}
