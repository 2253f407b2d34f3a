//! 气语言命令行入口
//!
//! 不带参数进入交互模式，带一个参数运行脚本文件。

use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::process;

use qi::i18n::{format_message, messages, Locale};
use qi::{config, InterpretResult, VM};

fn main() {
    let locale = Locale::from_env();
    let args: Vec<String> = env::args().collect();

    match args.len() {
        1 => repl(locale),
        2 => run_file(&args[1], locale),
        _ => {
            eprintln!(
                "{}",
                format_message(messages::MSG_CLI_USAGE, locale, &[&args[0]])
            );
            process::exit(64);
        }
    }
}

fn run_file(path: &str, locale: Locale) {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(error) => {
            eprintln!(
                "{}",
                format_message(
                    messages::MSG_CLI_CANNOT_READ_FILE,
                    locale,
                    &[path, &error.to_string()]
                )
            );
            process::exit(74);
        }
    };

    let mut vm = VM::new();
    vm.set_locale(locale);
    match vm.interpret(&source) {
        InterpretResult::Ok => {}
        InterpretResult::CompileError => process::exit(65),
        InterpretResult::RuntimeError => process::exit(70),
    }
}

fn repl(locale: Locale) {
    println!(
        "{}",
        format_message(
            messages::MSG_CLI_REPL_BANNER,
            locale,
            &[config::LANG_NAME, config::VERSION]
        )
    );

    let mut vm = VM::new();
    vm.set_locale(locale);
    let stdin = io::stdin();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        if line.trim().is_empty() {
            continue;
        }
        vm.interpret(&line);
    }
}
