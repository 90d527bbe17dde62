//! Read the process table from `/proc`
//!
//! Only the parts of `/proc/[pid]/stat` and `/proc/[pid]/cmdline` that a
//! process-count check needs are loaded.

use std::fmt;
use std::fs;
use std::io;
use std::num;
use std::path::Path;
use std::result::Result as StdResult;
use std::str::FromStr;

use derive_more::From;
use nix::errno::Errno;
use nix::unistd::Pid;

/// ProcFs errors
///
/// Every error in this module can be converted into a `ProcFsError`
#[derive(Debug, From)]
pub enum ProcFsError {
    /// Errors originating in IO, including processes that exited mid-read
    Io(io::Error),
    /// Happens when we try to parse an int from something in procfs
    InvalidInt(num::ParseIntError),
    /// A line from /proc/<pid>/stat that doesn't have the expected shape
    ParseStatError(ParseStatError),
    /// Happens when we get an invalid process state
    ParseStateError(ParseStateError),
}

impl fmt::Display for ProcFsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> StdResult<(), fmt::Error> {
        use self::ProcFsError::*;
        match *self {
            Io(ref e) => write!(f, "{}", e),
            InvalidInt(ref e) => write!(f, "{}", e),
            ParseStatError(ref e) => write!(f, "{}", e),
            ParseStateError(ref e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ProcFsError {}

#[derive(Debug)]
pub struct ParseStatError {
    pub line: String,
    pub field_name: &'static str,
}

impl fmt::Display for ParseStatError {
    fn fmt(&self, f: &mut fmt::Formatter) -> StdResult<(), fmt::Error> {
        write!(
            f,
            "unable to parse '{}' from stat line '{}'",
            self.field_name,
            self.line.trim()
        )
    }
}

#[derive(Debug)]
pub struct ParseStateError {
    state: String,
}

impl fmt::Display for ParseStateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> StdResult<(), fmt::Error> {
        write!(
            f,
            "String '{}' was not a valid state, expected one of \
             R,running, S,sleeping, D,uninterruptible-sleep, W,waiting, T,stopped, Z,zombie",
            self.state
        )
    }
}

pub type Result<T> = StdResult<T, ProcFsError>;

/// The state of the process
///
/// See `man 5 proc` for details
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum State {
    /// `R`: Currently using the CPU
    Running,
    /// `S`: Sleeping on an interruptible wait
    Sleeping,
    /// `D`: Sleeping on an uninterruptible or disk sleep
    UninterruptibleSleep,
    /// `W`: Paging, or waking on newer kernels
    Waiting,
    /// `T`/`t`: Traced or stopped on a signal
    Stopped,
    /// `Z`: No parent process has reaped this
    Zombie,
    /// `X`/`I` and anything else newer kernels invent
    Other,
}

impl FromStr for State {
    type Err = ProcFsError;

    /// Parse from either /proc/<pid>/stat or the command line
    fn from_str(s: &str) -> Result<State> {
        use self::State::*;
        match s {
            "R" | "running" => Ok(Running),
            "S" | "sleeping" => Ok(Sleeping),
            "D" | "uninterruptible-sleep" => Ok(UninterruptibleSleep),
            "W" | "waiting" => Ok(Waiting),
            "T" | "t" | "stopped" => Ok(Stopped),
            "Z" | "zombie" => Ok(Zombie),
            "X" | "x" | "I" | "K" | "P" => Ok(Other),
            _ => Err(ParseStateError {
                state: s.to_string(),
            }
            .into()),
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::State::*;
        f.write_str(match *self {
            Running => "running",
            Sleeping => "sleeping",
            UninterruptibleSleep => "uninterruptible-sleep",
            Waiting => "waiting",
            Stopped => "stopped",
            Zombie => "zombie",
            Other => "other",
        })
    }
}

/// The fields of `/proc/[pid]/stat` this crate cares about
#[derive(Clone, Debug, PartialEq)]
pub struct Stat {
    pub pid: Pid,
    /// The filename of the executable, without the parens
    pub comm: String,
    pub state: State,
    pub ppid: Pid,
}

impl FromStr for Stat {
    type Err = ProcFsError;

    /// Parse a `/proc/[pid]/stat` line
    ///
    /// `comm` may itself contain spaces and parens, so it is everything
    /// between the first `(` and the *last* `)`.
    fn from_str(s: &str) -> Result<Stat> {
        let err = |field_name| ParseStatError {
            line: s.to_owned(),
            field_name,
        };
        let open = s.find('(').ok_or_else(|| err("comm"))?;
        let close = s.rfind(')').ok_or_else(|| err("comm"))?;
        if close < open {
            return Err(err("comm").into());
        }
        let pid: i32 = s[..open].trim().parse()?;
        let comm = s[open + 1..close].to_owned();
        let mut rest = s[close + 1..].split_whitespace();
        let state = rest.next().ok_or_else(|| err("state"))?.parse()?;
        let ppid: i32 = rest.next().ok_or_else(|| err("ppid"))?.parse()?;
        Ok(Stat {
            pid: Pid::from_raw(pid),
            comm,
            state,
            ppid: Pid::from_raw(ppid),
        })
    }
}

/// The visible command line for a process
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CmdLine {
    pub raw: Vec<String>,
}

impl CmdLine {
    fn parse(contents: &[u8]) -> CmdLine {
        CmdLine {
            raw: contents
                .split(|b| *b == 0)
                .filter(|arg| !arg.is_empty())
                .map(|arg| String::from_utf8_lossy(arg).into_owned())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn display(&self) -> String {
        self.raw.join(" ")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Process {
    pub stat: Stat,
    pub cmdline: CmdLine,
}

impl Process {
    /// Load a process from a `/proc/[pid]` style directory
    pub fn from_dir(dir: &Path) -> Result<Process> {
        let stat = fs::read_to_string(dir.join("stat"))?.parse()?;
        let cmdline = CmdLine::parse(&fs::read(dir.join("cmdline"))?);
        Ok(Process { stat, cmdline })
    }

    /// The command line, or `comm` for processes without one (kernel threads)
    pub fn useful_cmdline(&self) -> String {
        if self.cmdline.is_empty() {
            self.stat.comm.clone()
        } else {
            self.cmdline.display()
        }
    }
}

fn vanished(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::NotFound || e.raw_os_error() == Some(Errno::ESRCH as i32)
}

/// Everything that could be read from a process table
#[derive(Debug, Default)]
pub struct RunningProcs {
    pub procs: Vec<Process>,
    /// Processes that could not be parsed. Processes that disappear between
    /// listing and reading are not errors and are not in here.
    pub errors: Vec<ProcFsError>,
}

impl RunningProcs {
    /// Load the currently running processes from /proc/[pid]/*
    pub fn currently_running() -> Result<RunningProcs> {
        RunningProcs::load_from(Path::new("/proc"))
    }

    /// Load processes from a procfs mounted at `root`
    pub fn load_from(root: &Path) -> Result<RunningProcs> {
        let mut running = RunningProcs::default();
        for entry in fs::read_dir(root)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            let is_pid = entry
                .file_name()
                .to_str()
                .map_or(false, |name| !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()));
            if !is_pid {
                continue;
            }
            match Process::from_dir(&entry.path()) {
                Ok(process) => running.procs.push(process),
                // the process exited while we were reading it
                Err(ProcFsError::Io(ref e)) if vanished(e) => {}
                Err(e) => running.errors.push(e),
            }
        }
        Ok(running)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::env;
    use std::fs;

    #[test]
    fn parses_stat_lines() {
        for (line, comm, state) in &[
            (
                "529 ((sd-proc)) S 885 885 885 0 -1 107793 24 0 0 0 0 \
                 0 0 0 20 0 1 0 7777777 111111111 647 18848888888888888888",
                "(sd-proc)",
                State::Sleeping,
            ),
            (
                "47 (migration/8) R 2 0 0 0 -1 66666668 0 0 0 0 0 14",
                "migration/8",
                State::Running,
            ),
            (
                "122 (statsd /app/connection) Z 103 103 181 0 -1 304 0626 0",
                "statsd /app/connection",
                State::Zombie,
            ),
        ] {
            let stat: Stat = line.parse().unwrap_or_else(|e| panic!("{}: {}", line, e));
            assert_eq!(stat.comm, *comm);
            assert_eq!(&stat.state, state);
        }
    }

    #[test]
    fn stat_fields() {
        let stat: Stat = "122 (statsd) S 103 103 181".parse().unwrap();
        assert_eq!(stat.pid, Pid::from_raw(122));
        assert_eq!(stat.ppid, Pid::from_raw(103));
    }

    #[test]
    fn bad_stat_lines_are_errors() {
        assert!("".parse::<Stat>().is_err());
        assert!("12 no-parens S 1".parse::<Stat>().is_err());
        assert!("12 (x)".parse::<Stat>().is_err());
        match "12 (x) Q 1".parse::<Stat>() {
            Err(ProcFsError::ParseStateError(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn parses_state_names() {
        assert_eq!("zombie".parse::<State>().unwrap(), State::Zombie);
        assert_eq!("D".parse::<State>().unwrap(), State::UninterruptibleSleep);
        assert!("napping".parse::<State>().is_err());
    }

    #[test]
    fn cmdline_splits_on_nul() {
        let cmd = CmdLine::parse(b"nginx: worker\0-g\0daemon off;\0");
        assert_eq!(cmd.raw, vec!["nginx: worker", "-g", "daemon off;"]);
        assert_eq!(cmd.display(), "nginx: worker -g daemon off;");
        assert!(CmdLine::parse(b"").is_empty());
    }

    #[test]
    fn loads_a_fake_procfs() {
        let root = env::temp_dir().join(format!("vigil-procfs-{}", std::process::id()));
        let _ = fs::remove_dir_all(&root);
        for (pid, stat, cmdline) in &[
            ("1", "1 (init) S 0 1 1", &b"/sbin/init\0"[..]),
            ("20", "20 (kthreadd) S 0 0 0", &b""[..]),
            ("33", "33 (broken) Q 1 0 0", &b"broken\0"[..]),
        ] {
            let dir = root.join(pid);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("stat"), stat).unwrap();
            fs::write(dir.join("cmdline"), cmdline).unwrap();
        }
        fs::create_dir_all(root.join("self-ish")).unwrap();

        let running = RunningProcs::load_from(&root).unwrap();
        let mut names: Vec<_> = running.procs.iter().map(Process::useful_cmdline).collect();
        names.sort();
        assert_eq!(names, vec!["/sbin/init", "kthreadd"]);
        assert_eq!(running.errors.len(), 1);

        fs::remove_dir_all(&root).unwrap();
    }
}
