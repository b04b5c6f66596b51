//! Assigns: short logical names for directories.
//!
//! An assign maps a name like `SYS` to an absolute path, letting user code
//! open `SYS:fonts/topaz` without knowing where the system volume lives.
//! Resolution happens in the VFS path walk.

use alloc::string::String;
use alloc::vec::Vec;
use viper_abi::{MAX_ASSIGN_NAME, VError, VResult};
use viper_hal::IrqSafeLock;

const MAX_ASSIGNS: usize = 16;

struct Assign {
    name: String,
    target: String,
}

static ASSIGNS: IrqSafeLock<Vec<Assign>> = IrqSafeLock::new(Vec::new());

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_ASSIGN_NAME
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Create or update a mapping. Targets must be absolute paths.
pub fn set(name: &str, target: &str) -> VResult<()> {
    if !valid_name(name) || !target.starts_with('/') {
        return Err(VError::InvalidArg);
    }

    let mut assigns = ASSIGNS.lock();
    if let Some(a) = assigns.iter_mut().find(|a| a.name == name) {
        a.target = String::from(target);
        return Ok(());
    }
    if assigns.len() >= MAX_ASSIGNS {
        return Err(VError::OutOfMemory);
    }
    assigns.push(Assign {
        name: String::from(name),
        target: String::from(target),
    });
    Ok(())
}

pub fn get(name: &str) -> VResult<String> {
    let assigns = ASSIGNS.lock();
    assigns
        .iter()
        .find(|a| a.name == name)
        .map(|a| a.target.clone())
        .ok_or(VError::NotFound)
}

pub fn remove(name: &str) -> VResult<()> {
    let mut assigns = ASSIGNS.lock();
    let before = assigns.len();
    assigns.retain(|a| a.name != name);
    if assigns.len() == before {
        return Err(VError::NotFound);
    }
    Ok(())
}

/// Snapshot of all mappings.
pub fn list() -> Vec<(String, String)> {
    ASSIGNS
        .lock()
        .iter()
        .map(|a| (a.name.clone(), a.target.clone()))
        .collect()
}

/// Split `NAME:rest` into its assign name and remainder. Paths without a
/// colon (or with a leading slash) are not assign-qualified.
pub fn split_prefix(path: &str) -> Option<(&str, &str)> {
    if path.starts_with('/') {
        return None;
    }
    let (name, rest) = path.split_once(':')?;
    valid_name(name).then_some((name, rest))
}

/// Expand an assign-qualified path into an absolute one.
pub fn resolve(path: &str) -> VResult<String> {
    let (name, rest) = split_prefix(path).ok_or(VError::InvalidArg)?;
    let mut target = get(name)?;
    if !rest.is_empty() {
        if !target.ends_with('/') {
            target.push('/');
        }
        target.push_str(rest);
    }
    Ok(target)
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::sched::task::testutil::sched_test_guard;

    #[test]
    fn set_get_remove_round_trip() {
        let _g = sched_test_guard();
        set("SYS0", "/system").unwrap();
        assert_eq!(get("SYS0").unwrap(), "/system");
        set("SYS0", "/newsys").unwrap();
        assert_eq!(get("SYS0").unwrap(), "/newsys");
        remove("SYS0").unwrap();
        assert_eq!(get("SYS0"), Err(VError::NotFound));
        assert_eq!(remove("SYS0"), Err(VError::NotFound));
    }

    #[test]
    fn invalid_names_and_targets_rejected() {
        let _g = sched_test_guard();
        assert_eq!(set("", "/x"), Err(VError::InvalidArg));
        assert_eq!(set("has space", "/x"), Err(VError::InvalidArg));
        assert_eq!(set("rel", "no-slash"), Err(VError::InvalidArg));
        assert_eq!(
            set("waaaaaaaaaaaaaaaaytoolong", "/x"),
            Err(VError::InvalidArg)
        );
    }

    #[test]
    fn prefix_resolution_expands() {
        let _g = sched_test_guard();
        set("DATA0", "/var/data").unwrap();
        assert_eq!(resolve("DATA0:logs/today").unwrap(), "/var/data/logs/today");
        assert_eq!(resolve("DATA0:").unwrap(), "/var/data");
        assert_eq!(resolve("NOPE0:x"), Err(VError::NotFound));
        remove("DATA0").unwrap();
    }

    #[test]
    fn split_prefix_ignores_plain_paths() {
        assert!(split_prefix("/absolute/path").is_none());
        assert!(split_prefix("relative/path").is_none());
        assert_eq!(split_prefix("SYS:cmds"), Some(("SYS", "cmds")));
    }
}
