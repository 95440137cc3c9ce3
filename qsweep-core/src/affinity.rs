//! CPU Affinity Pinning
//!
//! Reads an ordered logical-CPU list (one id per line, primary hardware
//! threads first, as written by the external topology tool) and restricts a
//! spawned worker to a prefix of it.

use std::io;
use std::path::Path;
use std::process::Command;

/// Ordered logical CPU ids available for pinning
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AffinityList {
    cpus: Vec<usize>,
}

impl AffinityList {
    /// Wrap an explicit list
    pub fn new(cpus: Vec<usize>) -> Self {
        Self { cpus }
    }

    /// Load a pinning file
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse one CPU id per line; blank lines are skipped
    pub fn parse(content: &str) -> io::Result<Self> {
        let mut cpus = Vec::new();
        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let cpu = line.parse::<usize>().map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("line {}: invalid CPU id {:?}", number + 1, line),
                )
            })?;
            cpus.push(cpu);
        }
        Ok(Self { cpus })
    }

    /// The first `count` CPUs, or the whole list if it is shorter
    pub fn select(&self, count: usize) -> &[usize] {
        &self.cpus[..count.min(self.cpus.len())]
    }

    /// All CPUs in pinning order
    pub fn cpus(&self) -> &[usize] {
        &self.cpus
    }

    /// Number of CPUs
    pub fn len(&self) -> usize {
        self.cpus.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.cpus.is_empty()
    }
}

/// Restrict the process spawned by `command` to `cpus`.
///
/// An empty slice leaves the command untouched. Ids beyond `CPU_SETSIZE` are
/// ignored.
#[cfg(target_os = "linux")]
pub fn pin_command(command: &mut Command, cpus: &[usize]) {
    use std::mem::MaybeUninit;
    use std::os::unix::process::CommandExt;

    let cpus: Vec<usize> = cpus
        .iter()
        .copied()
        .filter(|&cpu| cpu < libc::CPU_SETSIZE as usize)
        .collect();
    if cpus.is_empty() {
        return;
    }

    // SAFETY: the hook only touches a stack-local cpu_set_t and issues
    // sched_setaffinity, both async-signal-safe after fork.
    unsafe {
        command.pre_exec(move || {
            let mut set = MaybeUninit::<libc::cpu_set_t>::zeroed();
            let set_ref = set.assume_init_mut();

            libc::CPU_ZERO(set_ref);
            for &cpu in &cpus {
                libc::CPU_SET(cpu, set_ref);
            }

            let result =
                libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), set_ref);
            if result == 0 {
                Ok(())
            } else {
                Err(io::Error::last_os_error())
            }
        });
    }
}

/// Restrict the process spawned by `command` to `cpus`.
///
/// Pinning needs `sched_setaffinity`; on this platform the command is left
/// untouched.
#[cfg(not(target_os = "linux"))]
pub fn pin_command(_command: &mut Command, _cpus: &[usize]) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_and_select() {
        let list = AffinityList::parse("0\n2\n\n4\n1\n3\n").unwrap();

        assert_eq!(list.cpus(), &[0, 2, 4, 1, 3]);
        assert_eq!(list.select(3), &[0, 2, 4]);
        assert_eq!(list.select(10), &[0, 2, 4, 1, 3]);
        assert_eq!(list.len(), 5);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = AffinityList::parse("0\ncpu1\n").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "7").unwrap();
        writeln!(file, "5").unwrap();

        let list = AffinityList::load(file.path()).unwrap();
        assert_eq!(list.cpus(), &[7, 5]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_pinned_command_still_runs() {
        let mut command = Command::new("true");
        pin_command(&mut command, &[0]);
        let status = command.status().unwrap();
        assert!(status.success());
    }
}
