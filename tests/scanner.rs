#[cfg(test)]
mod scanner_tests {
    use rox::error::{Diagnostics, LoxError};
    use rox::expr::LiteralValue;
    use rox::scanner::*;
    use rox::token::*;

    fn assert_token_sequence(source: &str, expected: &[(TokenType, &str)]) {
        let scanner = Scanner::new(source);
        let tokens: Vec<_> = scanner.filter_map(Result::ok).collect();

        assert_eq!(tokens.len(), expected.len());

        for (actual, (expected_type, expected_lexeme)) in tokens.iter().zip(expected.iter()) {
            assert_eq!(actual.token_type, *expected_type);
            assert_eq!(actual.lexeme, *expected_lexeme);
        }
    }

    #[test]
    fn test_scanner_01_symbols() {
        assert_token_sequence(
            "({*.,+*})",
            &[
                (TokenType::LEFT_PAREN, "("),
                (TokenType::LEFT_BRACE, "{"),
                (TokenType::STAR, "*"),
                (TokenType::DOT, "."),
                (TokenType::COMMA, ","),
                (TokenType::PLUS, "+"),
                (TokenType::STAR, "*"),
                (TokenType::RIGHT_BRACE, "}"),
                (TokenType::RIGHT_PAREN, ")"),
                (TokenType::EOF, ""),
            ],
        );
    }

    #[test]
    fn test_two_char_operators_use_longest_match() {
        assert_token_sequence(
            "!= ! == = <= < >= > /",
            &[
                (TokenType::BANG_EQUAL, "!="),
                (TokenType::BANG, "!"),
                (TokenType::EQUAL_EQUAL, "=="),
                (TokenType::EQUAL, "="),
                (TokenType::LESS_EQUAL, "<="),
                (TokenType::LESS, "<"),
                (TokenType::GREATER_EQUAL, ">="),
                (TokenType::GREATER, ">"),
                (TokenType::SLASH, "/"),
                (TokenType::EOF, ""),
            ],
        );
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_token_sequence(
            "var orchid = nil; fun or_ and while",
            &[
                (TokenType::VAR, "var"),
                (TokenType::IDENTIFIER, "orchid"),
                (TokenType::EQUAL, "="),
                (TokenType::NIL, "nil"),
                (TokenType::SEMICOLON, ";"),
                (TokenType::FUN, "fun"),
                (TokenType::IDENTIFIER, "or_"),
                (TokenType::AND, "and"),
                (TokenType::WHILE, "while"),
                (TokenType::EOF, ""),
            ],
        );
    }

    #[test]
    fn test_number_literals() {
        let tokens: Vec<Token> = Scanner::new("123 45.67 8.").filter_map(Result::ok).collect();

        assert_eq!(tokens[0].literal(), Some(LiteralValue::Number(123.0)));
        assert_eq!(tokens[1].literal(), Some(LiteralValue::Number(45.67)));
        assert_eq!(tokens[1].lexeme, "45.67");

        // A trailing dot is not part of the number.
        assert_eq!(tokens[2].literal(), Some(LiteralValue::Number(8.0)));
        assert_eq!(tokens[3].token_type, TokenType::DOT);
    }

    #[test]
    fn test_string_literal_keeps_raw_text_and_counts_lines() {
        let tokens: Vec<Token> = Scanner::new("\"a\\n\nb\" x").filter_map(Result::ok).collect();

        assert_eq!(tokens[0].literal(), Some(LiteralValue::Str("a\\n\nb".to_string())));
        assert_eq!(tokens[1].lexeme, "x");
        assert_eq!(tokens[1].line, 2);
    }

    #[test]
    fn test_comments_are_skipped_and_lines_counted() {
        let tokens: Vec<Token> = Scanner::new("// nothing here\nprint 1; // trailing\n")
            .filter_map(Result::ok)
            .collect();

        assert_eq!(tokens[0].token_type, TokenType::PRINT);
        assert_eq!(tokens[0].line, 2);
        assert_eq!(tokens.last().unwrap().token_type, TokenType::EOF);
        assert_eq!(tokens.last().unwrap().line, 3);
    }

    #[test]
    fn test_unterminated_string_reports_opening_line() {
        let mut diagnostics = Diagnostics::new();
        let tokens = Scanner::new("print\n\"abc\ndef").scan_tokens(&mut diagnostics);

        assert!(diagnostics.had_error());
        assert_eq!(
            diagnostics.errors()[0].to_string(),
            "[line 2] Error: Unterminated string."
        );
        assert_eq!(tokens.last().unwrap().token_type, TokenType::EOF);
    }

    #[test]
    fn test_token_display() {
        let tokens: Vec<Token> = Scanner::new("42 \"hi\" x").filter_map(Result::ok).collect();

        assert_eq!(tokens[0].to_string(), "NUMBER 42 42.0");
        assert_eq!(tokens[1].to_string(), "STRING \"hi\" hi");
        assert_eq!(tokens[2].to_string(), "IDENTIFIER x null");
    }

    #[test]
    fn test_unexpected_chars_token_sequence() {
        let source = ",.$(#";
        let scanner = Scanner::new(source);

        // Collect all results (both tokens and errors)
        let results: Vec<_> = scanner.collect();

        // We expect this sequence:
        // 0: COMMA ','
        // 1: DOT '.'
        // 2: Error for '$'
        // 3: LEFT_PAREN '('
        // 4: Error for '#'
        // 5: EOF
        assert_eq!(results.len(), 6, "Expected 6 items in result");

        assert_token_matches(&results[0], TokenType::COMMA, ",");
        assert_token_matches(&results[1], TokenType::DOT, ".");
        assert_token_matches(&results[3], TokenType::LEFT_PAREN, "(");
        assert_token_matches(&results[5], TokenType::EOF, "");

        let error_count = results.iter().filter(|r| r.is_err()).count();
        assert_eq!(error_count, 2, "Expected 2 error messages");

        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(
                err.to_string().contains("Unexpected character"),
                "Error message should contain 'Unexpected character', got: {}",
                err
            );
        }

        fn assert_token_matches(
            result: &Result<Token, LoxError>,
            expected_type: TokenType,
            expected_lexeme: &str,
        ) {
            match result {
                Ok(token) => {
                    assert_eq!(
                        token.token_type, expected_type,
                        "Expected token type {:?}, got {:?}",
                        expected_type, token.token_type
                    );
                    assert_eq!(
                        token.lexeme, expected_lexeme,
                        "Expected lexeme '{}', got '{}'",
                        expected_lexeme, token.lexeme
                    );
                }
                Err(e) => panic!("Expected token but got error: {}", e),
            }
        }
    }

    #[test]
    fn test_non_ascii_character_is_one_error() {
        let mut diagnostics = Diagnostics::new();
        let tokens = Scanner::new("é;").scan_tokens(&mut diagnostics);

        assert_eq!(diagnostics.errors().len(), 1);
        assert_eq!(
            diagnostics.errors()[0].to_string(),
            "[line 1] Error: Unexpected character: é"
        );
        assert_eq!(tokens[0].token_type, TokenType::SEMICOLON);
    }

    #[test]
    fn test_eof_is_emitted_once() {
        let mut scanner = Scanner::new("");

        assert!(matches!(scanner.next(), Some(Ok(Token { token_type: TokenType::EOF, .. }))));
        assert!(scanner.next().is_none());
        assert!(scanner.next().is_none());
    }
}
