use std::process;

use log::{LevelFilter, info};
use simple_logger::SimpleLogger;

use ionc::driver::{self, Compilation};
use ionc::{CompileOptions, CompileResult, parser, tokenizer};

/// Prints an error message prefixed with the program name.
macro_rules! report_err {
  ($program:expr, $($arg:tt)+) => {{
    eprintln!(
      "\x1b[1;1m{}\x1b[0m: \x1b[1;31merror:\x1b[0m {}",
      $program,
      format!($($arg)+)
    );
  }};
}

mod args;

use args::{Args, Command, Stage};

fn main() {
  let args = match Args::parse() {
    Ok(Command::Run(args)) => args,
    Ok(Command::Help) => {
      print!("{}", args::usage(env!("CARGO_PKG_NAME")));
      return;
    }
    Ok(Command::Version) => {
      println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
      return;
    }
    Err(message) => {
      report_err!(env!("CARGO_PKG_NAME"), "{message}");
      eprint!("{}", args::usage(env!("CARGO_PKG_NAME")));
      process::exit(1);
    }
  };

  let level = match args.verbosity {
    0 => LevelFilter::Warn,
    1 => LevelFilter::Info,
    _ => LevelFilter::Trace,
  };
  if let Err(err) = SimpleLogger::new().with_level(level).init() {
    report_err!(args.program, "failed to initialize logger: {err}");
  }

  if let Err(err) = run(&args) {
    report_err!(args.program, "{err}");
    process::exit(1);
  }
}

fn run(args: &Args) -> CompileResult<()> {
  let options = CompileOptions {
    target: args.target,
    frame_slots: args.frame_slots,
  };

  match args.stage {
    Stage::Lex => {
      let source = driver::read_source(&args.in_path)?;
      for (i, token) in tokenizer::tokenize(&source)?.iter().enumerate() {
        println!("{i}: {token}");
      }
    }
    Stage::Parse => {
      let source = driver::read_source(&args.in_path)?;
      let ast = parser::parse(tokenizer::tokenize(&source)?, &source)?;
      print!("{ast}");
    }
    Stage::Asm => {
      let source = driver::read_source(&args.in_path)?;
      let Compilation { assembly, .. } = driver::compile_source(&source, &options)?;
      print!("{assembly}");
    }
    Stage::Build => {
      let exe_path = args.exe_path();
      let asm_path = driver::build(&args.in_path, &exe_path, &options)?;
      info!(
        "built '{}' (assembly in '{}')",
        exe_path.display(),
        asm_path.display()
      );
    }
  }
  Ok(())
}
