use std::process::exit;

use sstools::asm::{parser, Assembler};
use sstools::obj::write_object_file;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut output: Option<String> = None;
    let mut inputs: Vec<String> = Vec::new();
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-o" => {
                i += 1;
                if i < args.len() {
                    output = Some(args[i].clone());
                } else {
                    eprintln!("error: -o requires an argument");
                    exit(1);
                }
            }
            "-v" | "--verbose" => verbose = true,
            arg if arg.starts_with('-') => {
                eprintln!("error: unknown flag: {}", arg);
                exit(1);
            }
            _ => inputs.push(args[i].clone()),
        }
        i += 1;
    }

    if inputs.len() != 1 {
        eprintln!("usage: ssas [-v] -o <output> <input.s>");
        exit(1);
    }
    let output = match output {
        Some(path) => path,
        None => {
            eprintln!("error: no output file given (-o)");
            exit(1);
        }
    };

    let source = match std::fs::read_to_string(&inputs[0]) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("error: {}: {}", inputs[0], e);
            exit(1);
        }
    };

    let result = parser::parse_source(&source)
        .and_then(|stmts| Assembler::new(verbose).assemble(&stmts))
        .and_then(|data| write_object_file(&output, &data));

    if let Err(e) = result {
        eprintln!("error: {}: {}", inputs[0], e);
        exit(1);
    }
}
