//! VM CLI: load a bytecode image and evaluate it.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use matcha::{Image, Vm};

#[derive(Parser)]
#[command(
    name = "matchavm",
    about = "Run a compiled matcha bytecode image",
    version
)]
struct Args {
    /// Bytecode image to execute.
    #[arg(long = "in")]
    input: PathBuf,

    /// Dump the disassembly before running.
    #[arg(long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("matchavm: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> matcha::Result<()> {
    let image = Image::read_file(&args.input)?;

    if args.verbose {
        print!("{}", image.instructions.disassemble());
    }

    let mut vm = Vm::new(image);
    vm.run()?;

    for line in vm.take_output() {
        println!("{line}");
    }
    if let Some(result) = vm.stack_top() {
        println!("{result}");
    }
    Ok(())
}
