use std::process::exit;

use sstools::emu::{Cpu, Memory};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        eprintln!("usage: ssemu <memory image>");
        exit(1);
    }

    let memory = match Memory::load_image(&args[1]) {
        Ok(memory) => memory,
        Err(e) => {
            eprintln!("error: {}", e);
            exit(1);
        }
    };

    let mut cpu = Cpu::new(memory);
    if let Err(e) = cpu.run() {
        eprintln!("error: {}", e);
        exit(1);
    }
    exit(0);
}
