//! Compiler CLI: lower a source file to a bytecode image.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use matcha::{Compiler, parse};

#[derive(Parser)]
#[command(
    name = "matchac",
    about = "Compile a matcha source file to a bytecode image",
    version
)]
struct Args {
    /// Source file to compile.
    #[arg(long = "in")]
    input: PathBuf,

    /// Where to write the bytecode image.
    #[arg(long = "out")]
    output: PathBuf,

    /// Dump the constant pool and the top-level disassembly.
    #[arg(long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("matchac: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> matcha::Result<()> {
    let source = std::fs::read_to_string(&args.input)?;
    let program = parse(&source)?;
    let image = Compiler::compile(&program)?;

    if args.verbose {
        println!("constants:");
        for (index, constant) in image.constants.iter().enumerate() {
            println!("{index:04} {constant}");
        }
        println!("instructions:");
        print!("{}", image.instructions.disassemble());
    }

    image.write_file(&args.output)
}
