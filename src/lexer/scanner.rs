//! 词法扫描器
//!
//! 将源代码字符串转换为 Token 流

use super::token::{Token, TokenKind, Span};
use crate::i18n::{format_message, messages, Locale};

/// 词法扫描器
pub struct Scanner {
    /// 源代码字符
    source: Vec<char>,
    /// 当前位置
    current: usize,
    /// 当前 token 起始位置
    start: usize,
    /// 当前行号
    line: usize,
    /// 当前列号
    column: usize,
    /// token 起始列号
    start_column: usize,
    /// 诊断语言
    locale: Locale,
}

impl Scanner {
    /// 创建新的扫描器
    pub fn new(source: &str, locale: Locale) -> Self {
        Self {
            source: source.chars().collect(),
            current: 0,
            start: 0,
            line: 1,
            column: 1,
            start_column: 1,
            locale,
        }
    }

    /// 扫描所有 token
    pub fn scan_tokens(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();

        loop {
            let token = self.scan_token();
            let is_eof = token.is_eof();
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        tokens
    }

    /// 扫描单个 token
    pub fn scan_token(&mut self) -> Token {
        self.skip_whitespace();

        self.start = self.current;
        self.start_column = self.column;

        if self.is_at_end() {
            return self.make_token(TokenKind::Eof);
        }

        let c = self.advance();

        match c {
            // 分隔符
            '(' => self.make_token(TokenKind::LeftParen),
            ')' => self.make_token(TokenKind::RightParen),
            '{' => self.make_token(TokenKind::LeftBrace),
            '}' => self.make_token(TokenKind::RightBrace),
            '[' => self.make_token(TokenKind::LeftBracket),
            ']' => self.make_token(TokenKind::RightBracket),
            ',' => self.make_token(TokenKind::Comma),
            '.' => self.make_token(TokenKind::Dot),
            ';' => self.make_token(TokenKind::Semicolon),
            '~' => self.make_token(TokenKind::Tilde),
            '&' => self.make_token(TokenKind::Amp),
            '|' => self.make_token(TokenKind::Pipe),
            '^' => self.make_token(TokenKind::Caret),

            // + 和 ++ 和 +=
            '+' => {
                if self.match_char('+') {
                    self.make_token(TokenKind::PlusPlus)
                } else if self.match_char('=') {
                    self.make_token(TokenKind::PlusEqual)
                } else {
                    self.make_token(TokenKind::Plus)
                }
            }

            // - 和 -- 和 -=
            '-' => {
                if self.match_char('-') {
                    self.make_token(TokenKind::MinusMinus)
                } else if self.match_char('=') {
                    self.make_token(TokenKind::MinusEqual)
                } else {
                    self.make_token(TokenKind::Minus)
                }
            }

            // * 和 *=
            '*' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::StarEqual)
                } else {
                    self.make_token(TokenKind::Star)
                }
            }

            // / 和 /= 和注释
            '/' => {
                if self.match_char('/') {
                    self.skip_line_comment();
                    self.scan_token()
                } else if self.match_char('*') {
                    self.skip_block_comment();
                    self.scan_token()
                } else if self.match_char('=') {
                    self.make_token(TokenKind::SlashEqual)
                } else {
                    self.make_token(TokenKind::Slash)
                }
            }

            // % 和 %=
            '%' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::PercentEqual)
                } else {
                    self.make_token(TokenKind::Percent)
                }
            }

            // = 和 ==
            '=' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::EqualEqual)
                } else {
                    self.make_token(TokenKind::Equal)
                }
            }

            // ! 和 !=
            '!' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::BangEqual)
                } else {
                    self.make_token(TokenKind::Bang)
                }
            }

            // < 和 <= 和 <<
            '<' => {
                if self.match_char('<') {
                    self.make_token(TokenKind::LessLess)
                } else if self.match_char('=') {
                    self.make_token(TokenKind::LessEqual)
                } else {
                    self.make_token(TokenKind::Less)
                }
            }

            // > 和 >= 和 >>
            '>' => {
                if self.match_char('>') {
                    self.make_token(TokenKind::GreaterGreater)
                } else if self.match_char('=') {
                    self.make_token(TokenKind::GreaterEqual)
                } else {
                    self.make_token(TokenKind::Greater)
                }
            }

            // 字符串
            '"' => self.scan_string(),

            // 数字
            '0'..='9' => self.scan_number(),

            // 标识符或关键字（支持 Unicode）
            c if Self::is_identifier_start(c) => self.scan_identifier(),

            _ => {
                let msg = format_message(
                    messages::ERR_SCAN_UNEXPECTED_CHAR,
                    self.locale,
                    &[&c.to_string()],
                );
                self.error_token(&msg)
            }
        }
    }

    /// 跳过空白字符和换行
    fn skip_whitespace(&mut self) {
        while !self.is_at_end() {
            match self.peek() {
                ' ' | '\r' | '\t' => {
                    self.advance();
                }
                '\n' => {
                    self.advance();
                    self.line += 1;
                    self.column = 1;
                }
                _ => break,
            }
        }
    }

    /// 跳过单行注释
    fn skip_line_comment(&mut self) {
        while !self.is_at_end() && self.peek() != '\n' {
            self.advance();
        }
    }

    /// 跳过多行注释（可嵌套）
    fn skip_block_comment(&mut self) {
        let mut depth = 1;
        while !self.is_at_end() && depth > 0 {
            if self.peek() == '/' && self.peek_next() == Some('*') {
                self.advance();
                self.advance();
                depth += 1;
            } else if self.peek() == '*' && self.peek_next() == Some('/') {
                self.advance();
                self.advance();
                depth -= 1;
            } else {
                if self.peek() == '\n' {
                    self.line += 1;
                    self.column = 0;
                }
                self.advance();
            }
        }
    }

    /// 扫描字符串（双引号，支持转义）
    fn scan_string(&mut self) -> Token {
        let mut value = String::new();

        while !self.is_at_end() && self.peek() != '"' {
            if self.peek() == '\n' {
                self.line += 1;
                self.column = 0;
            }

            if self.peek() == '\\' {
                self.advance();
                if self.is_at_end() {
                    break;
                }
                match self.advance() {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '\\' => value.push('\\'),
                    '"' => value.push('"'),
                    '0' => value.push('\0'),
                    c => {
                        value.push('\\');
                        value.push(c);
                    }
                }
            } else {
                value.push(self.advance());
            }
        }

        if self.is_at_end() {
            let msg = format_message(messages::ERR_SCAN_UNTERMINATED_STRING, self.locale, &[]);
            return self.error_token(&msg);
        }

        // 消费闭合的引号
        self.advance();

        self.make_token(TokenKind::String(value))
    }

    /// 扫描数字（十进制整数或小数）
    fn scan_number(&mut self) -> Token {
        while !self.is_at_end() && self.peek().is_ascii_digit() {
            self.advance();
        }

        // 小数部分
        if self.peek() == '.' {
            if let Some(next) = self.peek_next() {
                if next.is_ascii_digit() {
                    self.advance();
                    while !self.is_at_end() && self.peek().is_ascii_digit() {
                        self.advance();
                    }
                }
            }
        }

        let lexeme: String = self.source[self.start..self.current].iter().collect();
        match lexeme.parse::<f64>() {
            Ok(value) => self.make_token(TokenKind::Number(value)),
            Err(_) => {
                let msg =
                    format_message(messages::ERR_SCAN_INVALID_NUMBER, self.locale, &[&lexeme]);
                self.error_token(&msg)
            }
        }
    }

    /// 扫描标识符或关键字（支持 Unicode 标识符）
    fn scan_identifier(&mut self) -> Token {
        while !self.is_at_end() && Self::is_identifier_continue(self.peek()) {
            self.advance();
        }

        let lexeme: String = self.source[self.start..self.current].iter().collect();
        let kind = Self::identifier_type(&lexeme);

        self.make_token(kind)
    }

    /// 检查字符是否可以作为标识符开头
    fn is_identifier_start(c: char) -> bool {
        c.is_alphabetic() || c == '_'
    }

    /// 检查字符是否可以作为标识符的后续字符
    fn is_identifier_continue(c: char) -> bool {
        c.is_alphanumeric() || c == '_'
    }

    /// 识别关键字或返回标识符
    fn identifier_type(lexeme: &str) -> TokenKind {
        match lexeme {
            "变量" => TokenKind::Var,
            "功能" => TokenKind::Fun,
            "类" => TokenKind::Class,
            "如果" => TokenKind::If,
            "否则" => TokenKind::Else,
            "当" => TokenKind::While,
            "循环" => TokenKind::For,
            "返回" => TokenKind::Return,
            "打印" => TokenKind::Print,
            "真" => TokenKind::True,
            "假" => TokenKind::False,
            "空" => TokenKind::Nil,
            "和" => TokenKind::And,
            "或" => TokenKind::Or,
            "这" => TokenKind::This,
            "超" => TokenKind::Super,
            _ => TokenKind::Identifier(lexeme.to_string()),
        }
    }

    /// 判断是否到达源码末尾
    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    /// 前进一个字符并返回
    fn advance(&mut self) -> char {
        let c = self.source[self.current];
        self.current += 1;
        self.column += 1;
        c
    }

    /// 查看当前字符
    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.source[self.current]
        }
    }

    /// 查看下一个字符
    fn peek_next(&self) -> Option<char> {
        if self.current + 1 >= self.source.len() {
            None
        } else {
            Some(self.source[self.current + 1])
        }
    }

    /// 如果当前字符匹配，则前进
    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.source[self.current] != expected {
            false
        } else {
            self.current += 1;
            self.column += 1;
            true
        }
    }

    /// 创建 token
    fn make_token(&self, kind: TokenKind) -> Token {
        let lexeme: String = self.source[self.start..self.current].iter().collect();
        let span = Span::new(self.start, self.current, self.line, self.start_column);
        Token::new(kind, lexeme, span)
    }

    /// 创建错误 token，保留出错处的原文
    fn error_token(&self, message: &str) -> Token {
        let lexeme: String = self.source[self.start..self.current].iter().collect();
        let span = Span::new(self.start, self.current, self.line, self.start_column);
        Token::new(TokenKind::Error(message.to_string()), lexeme, span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &str) -> Vec<Token> {
        Scanner::new(source, Locale::Zh).scan_tokens()
    }

    #[test]
    fn test_scan_numbers() {
        let tokens = scan("123 45.67");

        assert!(matches!(tokens[0].kind, TokenKind::Number(n) if n == 123.0));
        assert!(matches!(tokens[1].kind, TokenKind::Number(n) if (n - 45.67).abs() < 1e-9));
    }

    #[test]
    fn test_scan_strings() {
        let tokens = scan("\"你好\" \"a\\nb\"");

        assert!(matches!(&tokens[0].kind, TokenKind::String(s) if s == "你好"));
        assert!(matches!(&tokens[1].kind, TokenKind::String(s) if s == "a\nb"));
    }

    #[test]
    fn test_unterminated_string() {
        let tokens = scan("\"你好");
        assert!(tokens[0].is_error());
    }

    #[test]
    fn test_scan_operators() {
        let tokens = scan("+ - * / % == != ++ -- += -= *= /= %= << >> & | ^ ~");

        let expected = [
            TokenKind::Plus,
            TokenKind::Minus,
            TokenKind::Star,
            TokenKind::Slash,
            TokenKind::Percent,
            TokenKind::EqualEqual,
            TokenKind::BangEqual,
            TokenKind::PlusPlus,
            TokenKind::MinusMinus,
            TokenKind::PlusEqual,
            TokenKind::MinusEqual,
            TokenKind::StarEqual,
            TokenKind::SlashEqual,
            TokenKind::PercentEqual,
            TokenKind::LessLess,
            TokenKind::GreaterGreater,
            TokenKind::Amp,
            TokenKind::Pipe,
            TokenKind::Caret,
            TokenKind::Tilde,
        ];
        for (token, kind) in tokens.iter().zip(expected.iter()) {
            assert_eq!(&token.kind, kind);
        }
    }

    #[test]
    fn test_scan_keywords() {
        let tokens = scan("变量 功能 类 如果 否则 当 循环 返回 打印 真 假 空 和 或 这 超");

        let expected = [
            TokenKind::Var,
            TokenKind::Fun,
            TokenKind::Class,
            TokenKind::If,
            TokenKind::Else,
            TokenKind::While,
            TokenKind::For,
            TokenKind::Return,
            TokenKind::Print,
            TokenKind::True,
            TokenKind::False,
            TokenKind::Nil,
            TokenKind::And,
            TokenKind::Or,
            TokenKind::This,
            TokenKind::Super,
        ];
        for (token, kind) in tokens.iter().zip(expected.iter()) {
            assert_eq!(&token.kind, kind);
        }
    }

    #[test]
    fn test_scan_chinese_identifiers() {
        let tokens = scan("数学 甲乙 _内部 foo2");

        assert!(matches!(&tokens[0].kind, TokenKind::Identifier(s) if s == "数学"));
        assert!(matches!(&tokens[1].kind, TokenKind::Identifier(s) if s == "甲乙"));
        assert!(matches!(&tokens[2].kind, TokenKind::Identifier(s) if s == "_内部"));
        assert!(matches!(&tokens[3].kind, TokenKind::Identifier(s) if s == "foo2"));
    }

    #[test]
    fn test_keyword_prefix_stays_identifier() {
        // 最长匹配：以关键字开头的更长标识符不是关键字
        let tokens = scan("打印机 类型");
        assert!(matches!(&tokens[0].kind, TokenKind::Identifier(s) if s == "打印机"));
        assert!(matches!(&tokens[1].kind, TokenKind::Identifier(s) if s == "类型"));
    }

    #[test]
    fn test_comments_and_lines() {
        let tokens = scan("1 // 注释\n/* 多行\n注释 */ 2");

        assert!(matches!(tokens[0].kind, TokenKind::Number(n) if n == 1.0));
        assert!(matches!(tokens[1].kind, TokenKind::Number(n) if n == 2.0));
        assert_eq!(tokens[0].span.line, 1);
        assert_eq!(tokens[1].span.line, 3);
    }

    #[test]
    fn test_unexpected_char() {
        let tokens = scan("@");
        assert!(tokens[0].is_error());
        assert_eq!(tokens[0].lexeme, "@");
    }
}
