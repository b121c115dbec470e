use std::process::exit;

use sstools::common::literal::parse_literal;
use sstools::linker::{resolve_output_mode, Linker};

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut output: Option<String> = None;
    let mut places: Vec<(String, u32)> = Vec::new();
    let mut inputs: Vec<String> = Vec::new();
    let mut hex = false;
    let mut relocatable = false;
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "-o" => {
                i += 1;
                if i < args.len() {
                    output = Some(args[i].clone());
                } else {
                    eprintln!("error: -o requires an argument");
                    exit(1);
                }
            }
            "-hex" => hex = true,
            "-relocatable" => relocatable = true,
            "-v" | "--verbose" => verbose = true,
            _ if arg.starts_with("-place=") => {
                let spec = &arg["-place=".len()..];
                let (name, address) = match spec.split_once('@') {
                    Some(pair) => pair,
                    None => {
                        eprintln!("error: malformed placement '{}', expected name@address", arg);
                        exit(1);
                    }
                };
                let address = match parse_literal(address) {
                    Ok(value) => value,
                    Err(e) => {
                        eprintln!("error: {}", e);
                        exit(1);
                    }
                };
                places.push((name.to_string(), address));
            }
            _ if arg.starts_with('-') => {
                eprintln!("error: unknown flag: {}", arg);
                exit(1);
            }
            _ => inputs.push(args[i].clone()),
        }
        i += 1;
    }

    // Exactly one output mode, decided before any input file is touched.
    let mode = match resolve_output_mode(hex, relocatable) {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("error: {}", e);
            exit(1);
        }
    };

    let output = match output {
        Some(path) => path,
        None => {
            eprintln!("error: no output file given (-o)");
            exit(1);
        }
    };
    if inputs.is_empty() {
        eprintln!("error: no input files");
        exit(1);
    }

    let linker = Linker::new(inputs, places, output, mode, verbose);
    if let Err(e) = linker.link() {
        eprintln!("error: {}", e);
        exit(1);
    }
}
