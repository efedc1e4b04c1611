//! Module for parsing command-line arguments passed to the compiler.

use std::path::PathBuf;

use ionc::Target;
use ionc::scope::DEFAULT_FRAME_SLOTS;

/// Compilation phase to stop after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  /// Print the token stream.
  Lex,
  /// Print the syntax tree.
  Parse,
  /// Print the assembly to stdout.
  Asm,
  /// Write the assembly and run `as` + `ld`.
  Build,
}

/// Compiler command-line arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
  /// Name of the program.
  pub program: String,
  pub stage: Stage,
  /// Input source file (required).
  pub in_path: PathBuf,
  /// Executable path for `build`. Defaults to the input path without its
  /// extension.
  pub out_path: Option<PathBuf>,
  pub target: Target,
  pub frame_slots: usize,
  /// Number of `-v` flags given.
  pub verbosity: u8,
}

/// Outcome of argument parsing.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
  Run(Args),
  Help,
  Version,
}

impl Args {
  /// Parses `std::env::args()`.
  pub fn parse() -> Result<Command, String> {
    Self::try_parse_from(std::env::args())
  }

  pub fn try_parse_from<I>(args: I) -> Result<Command, String>
  where
    I: IntoIterator<Item = String>,
  {
    let mut args = args.into_iter().peekable();
    let program = args.next().unwrap_or_else(|| "ionc".into());

    let mut stage = Stage::Build;
    let mut out_path = None;
    let mut target = Target::host();
    let mut frame_slots = DEFAULT_FRAME_SLOTS;
    let mut verbosity = 0u8;

    while let Some(arg) = args.next_if(|arg| arg.starts_with('-')) {
      let Some(flag) = FLAG_REGISTRY
        .iter()
        .find(|flag| flag.names.contains(&arg.as_str()))
      else {
        return Err(format!("invalid flag '{arg}'"));
      };

      let mut value = || {
        args
          .next()
          .ok_or_else(|| format!("missing value after '{}'", flag.names.join("'|'")))
      };

      match flag.names[1] {
        "--stage" => {
          stage = match value()?.as_str() {
            "lex" => Stage::Lex,
            "parse" => Stage::Parse,
            "asm" => Stage::Asm,
            "build" => Stage::Build,
            other => return Err(format!("invalid stage: '{other}'")),
          }
        }
        "--output" => out_path = Some(PathBuf::from(value()?)),
        "--target" => target = value()?.parse()?,
        "--frame-slots" => {
          let raw = value()?;
          frame_slots = raw
            .parse()
            .ok()
            .filter(|&slots: &usize| slots > 0)
            .ok_or_else(|| format!("invalid slot count: '{raw}'"))?;
        }
        "--verbose" => verbosity = verbosity.saturating_add(1),
        "--help" => return Ok(Command::Help),
        "--version" => return Ok(Command::Version),
        _ => unreachable!("every registered flag is handled"),
      }
    }

    // Input file should come after all flags have been processed.
    let Some(in_path) = args.next() else {
      return Err("no input file".into());
    };
    if let Some(extra) = args.next() {
      return Err(format!("unexpected argument '{extra}'"));
    }

    Ok(Command::Run(Args {
      program,
      stage,
      in_path: PathBuf::from(in_path),
      out_path,
      target,
      frame_slots,
      verbosity,
    }))
  }

  /// Executable path for `build`, never the input file itself.
  pub fn exe_path(&self) -> PathBuf {
    if let Some(path) = &self.out_path {
      return path.clone();
    }
    let path = self.in_path.with_extension("");
    if path == self.in_path {
      path.with_extension("out")
    } else {
      path
    }
  }
}

struct Flag {
  names: [&'static str; 2],
  description: &'static str,
}

const FLAG_REGISTRY: &[Flag] = &[
  Flag {
    names: ["-s", "--stage"],
    description: "      stop after 'lex', 'parse' or 'asm'; 'build' (default) links an executable.",
  },
  Flag {
    names: ["-o", "--output"],
    description: "     executable path. defaults to the input path without extension.",
  },
  Flag {
    names: ["-t", "--target"],
    description: "     'macos' or 'linux'. defaults to the host.",
  },
  Flag {
    names: ["-f", "--frame-slots"],
    description: "maximum number of live variables (default 8).",
  },
  Flag {
    names: ["-v", "--verbose"],
    description: "    log phase timings; repeat to trace scopes.",
  },
  Flag {
    names: ["-h", "--help"],
    description: "       print this summary.",
  },
  Flag {
    names: ["-V", "--version"],
    description: "    show version.",
  },
];

pub fn usage(program: &str) -> String {
  let mut out = format!(
    "\x1b[1;1musage:\x1b[0m\n      {program} [options] <infile>\n\x1b[1;1moptions:\x1b[0m\n"
  );
  for flag in FLAG_REGISTRY {
    out.push_str(&format!("   {}  {}\n", flag.names.join(", "), flag.description));
  }
  out
}
