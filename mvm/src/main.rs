#[macro_use]
extern crate clap;

use std::fs::File;
use std::io::prelude::*;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use clap::Arg;
use metro_vcpu::Machine;

#[derive(Debug)]
enum IOErrorContext {
    ReadInput,
}

#[derive(Debug)]
enum Error {
    Assemble(asm::Error),
    Runtime(metro_vcpu::RuntimeError),
    Io(std::io::Error, IOErrorContext, PathBuf),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err, context, path) => write!(
                f,
                "{} file \"{}\" failed: {}",
                match context {
                    IOErrorContext::ReadInput => "reading input",
                },
                path.display(),
                err
            ),
            Error::Assemble(err) => write!(f, "assembling input failed: {}", err),
            Error::Runtime(err) => write!(f, "program failed at runtime: {}", err),
        }
    }
}

fn main() {
    let matches = app_from_crate!()
        .arg(
            Arg::with_name("INPUT")
                .help("Source file to assemble and run")
                .required(true)
                .index(1),
        )
        .get_matches();

    let input = matches.value_of("INPUT").unwrap();

    if let Err(err) = run(input) {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

fn run(input: &str) -> Result<(), Error> {
    let input_path = Path::new(input);

    let input_file = File::open(input_path)
        .map_err(|err| Error::Io(err, IOErrorContext::ReadInput, input_path.to_owned()))?;
    let mut source = String::new();
    BufReader::new(input_file)
        .read_to_string(&mut source)
        .map_err(|err| Error::Io(err, IOErrorContext::ReadInput, input_path.to_owned()))?;

    let program = asm::assemble(&source).map_err(Error::Assemble)?;

    let mut machine = Machine::new();
    machine.execute(&program).map_err(Error::Runtime)?;

    print_registers(&machine);
    print_stack(&machine);

    Ok(())
}

fn print_registers(machine: &Machine) {
    for i in (0..16u8).step_by(2) {
        println!(
            "r{}{}  {:016X}   r{}{}  {:016X}",
            i,
            if i < 10 { " " } else { "" },
            machine.register(i),
            i + 1,
            if i + 1 < 10 { " " } else { "" },
            machine.register(i + 1)
        );
    }
}

fn print_stack(machine: &Machine) {
    for (i, slot) in machine.stack_slots(10).iter().enumerate() {
        println!("stack {}: {:016X}", i, slot);
    }
}
