//! Operating-system conventions for the generated AArch64 program.
//!
//! The instruction stream is identical on every target; only the entry-point
//! symbol, the exit syscall and the linker invocation differ.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
  /// Apple silicon, Mach-O. Syscall number in `x16`, `svc #0x80`.
  MacOs,
  /// AArch64 Linux, ELF. Syscall number in `x8`, `svc #0`.
  Linux,
}

impl Target {
  /// The target matching the machine the compiler runs on.
  pub fn host() -> Self {
    if cfg!(target_os = "macos") {
      Target::MacOs
    } else {
      Target::Linux
    }
  }

  pub fn entry_label(self) -> &'static str {
    match self {
      Target::MacOs => "_main",
      Target::Linux => "_start",
    }
  }

  /// Instructions that terminate the process with the status held in `x0`.
  pub fn exit_sequence(self) -> &'static [&'static str] {
    match self {
      Target::MacOs => &["mov x16, #1", "svc #0x80"],
      Target::Linux => &["mov x8, #93", "svc #0"],
    }
  }

  /// Extra arguments for `ld`, after the object file.
  pub fn linker_args(self) -> Vec<String> {
    let mut args = vec!["-e".to_string(), self.entry_label().to_string()];
    if self == Target::MacOs {
      args.extend(["-arch".to_string(), "arm64".to_string(), "-lSystem".to_string()]);
    }
    args
  }
}

impl fmt::Display for Target {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Target::MacOs => write!(f, "macos"),
      Target::Linux => write!(f, "linux"),
    }
  }
}

impl FromStr for Target {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "macos" | "darwin" => Ok(Target::MacOs),
      "linux" => Ok(Target::Linux),
      other => Err(format!("unknown target '{other}', expected 'macos' or 'linux'")),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_names() {
    assert_eq!("macos".parse(), Ok(Target::MacOs));
    assert_eq!("darwin".parse(), Ok(Target::MacOs));
    assert_eq!("linux".parse(), Ok(Target::Linux));
    assert!("windows".parse::<Target>().is_err());
    assert_eq!(Target::Linux.to_string().parse(), Ok(Target::Linux));
  }

  #[test]
  fn linker_uses_entry_label() {
    assert_eq!(Target::Linux.linker_args(), vec!["-e", "_start"]);
    assert_eq!(&Target::MacOs.linker_args()[..2], &["-e", "_main"]);
  }
}
