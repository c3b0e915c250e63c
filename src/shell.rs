//! `ucos` diagnostic command
//!
//! `ucos` prints the API version and, with statistics enabled, the CPU
//! usage. `ucos -task|-sem|-mutex|-q|-flag|-tmr` lists the live objects of
//! one kind by name.

use core::fmt;

use crate::config::{OS_VERSION, WRAPPER_VERSION};
use crate::kernel::os_dbg_names;
use crate::types::OsObjType;

const USAGE: &str = "usage: ucos [-task | -sem | -mutex | -q | -flag | -tmr]";

fn list(out: &mut impl fmt::Write, title: &str, kind: OsObjType) -> fmt::Result {
    let names = os_dbg_names(kind);
    writeln!(out, "{} ({}):", title, names.len())?;
    for name in names {
        writeln!(out, "  {}", name)?;
    }
    Ok(())
}

/// Run the `ucos` command; `args` excludes the command name
pub fn ucos_cmd(args: &[&str], out: &mut impl fmt::Write) -> fmt::Result {
    match args {
        [] => {
            writeln!(
                out,
                "uC/OS-III API V{}.{:02}.{:02} (layer {})",
                OS_VERSION / 10000,
                OS_VERSION / 100 % 100,
                OS_VERSION % 100,
                WRAPPER_VERSION
            )?;
            #[cfg(feature = "stat")]
            {
                let usage = crate::stat::os_stat_cpu_usage();
                writeln!(out, "CPU usage: {}.{:02}%", usage / 100, usage % 100)?;
            }
            Ok(())
        }
        ["-task"] => list(out, "tasks", OsObjType::Task),
        ["-sem"] => list(out, "semaphores", OsObjType::Sem),
        ["-mutex"] => list(out, "mutexes", OsObjType::Mutex),
        ["-q"] => list(out, "queues", OsObjType::Queue),
        ["-flag"] => list(out, "flag groups", OsObjType::Flag),
        ["-tmr"] => list(out, "timers", OsObjType::Timer),
        _ => writeln!(out, "{}", USAGE),
    }
}
