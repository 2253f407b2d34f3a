//! 词法分析模块

pub mod token;
pub mod scanner;

pub use token::{Token, TokenKind, Span};
pub use scanner::Scanner;
