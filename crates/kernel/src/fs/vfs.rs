//! VFS façade.
//!
//! The concrete file system sits behind the [`FileSystem`] trait; the
//! façade owns path resolution (cwd-relative walks, assigns, symlinks) and
//! the getdents record packing. Directory mutators sync the file system on
//! success so a crash loses at most the operation in flight.

use crate::assign;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use viper_abi::open_flags;
use viper_abi::{DIRENT_HEADER_LEN, DirEnt, Stat, VError, VResult, dirent_type};
use viper_utils::Once;

/// Node type as the file system reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
    Symlink,
}

impl NodeKind {
    pub fn dirent_type(self) -> u8 {
        match self {
            Self::File => dirent_type::FILE,
            Self::Directory => dirent_type::DIRECTORY,
            Self::Symlink => dirent_type::SYMLINK,
        }
    }
}

/// One directory entry as enumerated by the file system.
pub struct DirEntry {
    pub ino: u64,
    pub kind: NodeKind,
    pub name: String,
}

/// The seam to the concrete file system. Inode numbers are stable for the
/// life of the node; 0 is never a valid inode.
pub trait FileSystem: Send + Sync {
    fn root(&self) -> u64;
    fn lookup(&self, dir: u64, name: &str) -> VResult<u64>;
    fn node_kind(&self, ino: u64) -> VResult<NodeKind>;
    fn create(&self, dir: u64, name: &str) -> VResult<u64>;
    fn read(&self, ino: u64, offset: u64, buf: &mut [u8]) -> VResult<usize>;
    fn write(&self, ino: u64, offset: u64, data: &[u8]) -> VResult<usize>;
    fn truncate(&self, ino: u64) -> VResult<()>;
    fn stat(&self, ino: u64) -> VResult<Stat>;
    /// Entry at position `index`, or `None` past the end.
    fn read_dir(&self, dir: u64, index: usize) -> VResult<Option<DirEntry>>;
    fn mkdir(&self, dir: u64, name: &str) -> VResult<u64>;
    fn rmdir(&self, dir: u64, name: &str) -> VResult<()>;
    fn unlink(&self, dir: u64, name: &str) -> VResult<()>;
    fn rename(&self, src_dir: u64, src: &str, dst_dir: u64, dst: &str) -> VResult<()>;
    fn symlink(&self, dir: u64, name: &str, target: &str) -> VResult<u64>;
    fn readlink(&self, ino: u64) -> VResult<String>;
    /// Flush dirty state. No-op for memory-backed implementations.
    fn sync(&self);
}

static ROOT_FS: Once<Arc<dyn FileSystem>> = Once::new();

/// Install the root file system. Called once at boot.
pub fn mount_root(fs: Arc<dyn FileSystem>) {
    ROOT_FS.call_once(|| fs);
    log::info!("[vfs] root file system mounted");
}

fn root_fs() -> VResult<&'static Arc<dyn FileSystem>> {
    ROOT_FS.get().ok_or(VError::NotFound)
}

/// Maximum symlink hops in one resolution.
const MAX_SYMLINK_DEPTH: usize = 8;

/// Join `path` onto `cwd` (assign prefixes expand first) and produce the
/// component list of an absolute path, with `.`/`..` folded away.
fn absolute_components(cwd: &str, path: &str) -> VResult<Vec<String>> {
    let expanded;
    let path = match assign::split_prefix(path) {
        Some(_) => {
            expanded = assign::resolve(path)?;
            expanded.as_str()
        }
        None => path,
    };

    let mut parts: Vec<String> = Vec::new();
    if !path.starts_with('/') {
        for c in cwd.split('/').filter(|c| !c.is_empty()) {
            parts.push(String::from(c));
        }
    }
    for c in path.split('/') {
        match c {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            c => parts.push(String::from(c)),
        }
    }
    Ok(parts)
}

fn walk(fs: &Arc<dyn FileSystem>, parts: &[String], depth: usize) -> VResult<u64> {
    if depth > MAX_SYMLINK_DEPTH {
        return Err(VError::Io);
    }

    let mut stack: Vec<u64> = alloc::vec![fs.root()];
    for (i, part) in parts.iter().enumerate() {
        let dir = *stack.last().ok_or(VError::Unknown)?;
        let ino = fs.lookup(dir, part)?;
        match fs.node_kind(ino)? {
            NodeKind::Symlink => {
                let target = fs.readlink(ino)?;
                // Re-resolve: target replaces this component; the remaining
                // components append after it.
                let mut base = if target.starts_with('/') {
                    Vec::new()
                } else {
                    // Relative to the containing directory.
                    parts[..i].to_vec()
                };
                for c in target.split('/') {
                    match c {
                        "" | "." => {}
                        ".." => {
                            base.pop();
                        }
                        c => base.push(String::from(c)),
                    }
                }
                base.extend_from_slice(&parts[i + 1..]);
                return walk(fs, &base, depth + 1);
            }
            _ => stack.push(ino),
        }
    }
    stack.last().copied().ok_or(VError::Unknown)
}

/// Resolve a path (absolute, cwd-relative, or assign-qualified) to an inode.
pub fn resolve(cwd: &str, path: &str) -> VResult<u64> {
    let fs = root_fs()?;
    let parts = absolute_components(cwd, path)?;
    walk(fs, &parts, 0)
}

/// Resolve the parent directory of `path`; returns `(dir_ino, last_name)`.
pub fn resolve_parent(cwd: &str, path: &str) -> VResult<(u64, String)> {
    let fs = root_fs()?;
    let mut parts = absolute_components(cwd, path)?;
    let name = parts.pop().ok_or(VError::InvalidArg)?;
    let dir = walk(fs, &parts, 0)?;
    if fs.node_kind(dir)? != NodeKind::Directory {
        return Err(VError::InvalidArg);
    }
    Ok((dir, name))
}

pub fn node_kind(ino: u64) -> VResult<NodeKind> {
    root_fs()?.node_kind(ino)
}

/// Resolve a path relative to a directory inode (the handle-FS entry
/// point). `..` does not cross the anchor and is rejected; relative
/// symlink targets are not followed from here.
pub fn resolve_at(dir: u64, path: &str) -> VResult<u64> {
    if path.starts_with('/') {
        return resolve("/", path);
    }
    let fs = root_fs()?;
    let mut cur = dir;
    for comp in path.split('/') {
        match comp {
            "" | "." => {}
            ".." => return Err(VError::InvalidArg),
            name => {
                let ino = fs.lookup(cur, name)?;
                cur = match fs.node_kind(ino)? {
                    NodeKind::Symlink => {
                        let target = fs.readlink(ino)?;
                        if target.starts_with('/') {
                            resolve("/", &target)?
                        } else {
                            return Err(VError::Io);
                        }
                    }
                    _ => ino,
                };
            }
        }
    }
    Ok(cur)
}

/// Open with `O_CREAT`/`O_TRUNC` handling; returns `(ino, kind)`.
pub fn open(cwd: &str, path: &str, flags: u32) -> VResult<(u64, NodeKind)> {
    let fs = root_fs()?;

    let ino = match resolve(cwd, path) {
        Ok(ino) => ino,
        Err(VError::NotFound) if flags & open_flags::O_CREAT != 0 => {
            let (dir, name) = resolve_parent(cwd, path)?;
            fs.create(dir, &name)?
        }
        Err(e) => return Err(e),
    };

    let kind = fs.node_kind(ino)?;
    if kind == NodeKind::File && flags & open_flags::O_TRUNC != 0 {
        fs.truncate(ino)?;
    }
    Ok((ino, kind))
}

pub fn read_at(ino: u64, offset: u64, buf: &mut [u8]) -> VResult<usize> {
    root_fs()?.read(ino, offset, buf)
}

pub fn write_at(ino: u64, offset: u64, data: &[u8]) -> VResult<usize> {
    root_fs()?.write(ino, offset, data)
}

pub fn stat_ino(ino: u64) -> VResult<Stat> {
    root_fs()?.stat(ino)
}

pub fn stat_path(cwd: &str, path: &str) -> VResult<Stat> {
    let ino = resolve(cwd, path)?;
    stat_ino(ino)
}

/// Pack directory entries starting at `index` into `buf` as 8-byte-aligned
/// [`DirEnt`] records. Returns `(bytes_written, next_index)`; a buffer that
/// cannot fit the next record yields 0 bytes without advancing.
pub fn getdents(dir: u64, index: usize, buf: &mut [u8]) -> VResult<(usize, usize)> {
    let fs = root_fs()?;
    if fs.node_kind(dir)? != NodeKind::Directory {
        return Err(VError::InvalidArg);
    }

    let mut pos = 0usize;
    let mut idx = index;

    while let Some(entry) = fs.read_dir(dir, idx)? {
        let namelen = entry.name.len().min(255);
        let reclen = DirEnt::record_len(namelen);
        if pos + reclen > buf.len() {
            break;
        }

        let rec = &mut buf[pos..pos + reclen];
        rec.fill(0);
        rec[0..8].copy_from_slice(&entry.ino.to_le_bytes());
        rec[8..10].copy_from_slice(&(reclen as u16).to_le_bytes());
        rec[10] = entry.kind.dirent_type();
        rec[11] = namelen as u8;
        rec[DIRENT_HEADER_LEN..DIRENT_HEADER_LEN + namelen]
            .copy_from_slice(&entry.name.as_bytes()[..namelen]);
        // NUL terminator is already in place from the fill.

        pos += reclen;
        idx += 1;
    }

    Ok((pos, idx))
}

/// Create a file directly inside a directory inode (handle-FS path).
pub fn create_at(dir: u64, name: &str) -> VResult<u64> {
    let fs = root_fs()?;
    let ino = fs.create(dir, name)?;
    fs.sync();
    Ok(ino)
}

/// Pack exactly one directory record; `Ok(None)` at end of directory, and
/// `InvalidArg` when the buffer cannot hold the record.
pub fn getdents_one(dir: u64, index: usize, buf: &mut [u8]) -> VResult<Option<usize>> {
    let fs = root_fs()?;
    let Some(entry) = fs.read_dir(dir, index)? else {
        return Ok(None);
    };

    let namelen = entry.name.len().min(255);
    let reclen = DirEnt::record_len(namelen);
    if reclen > buf.len() {
        return Err(VError::InvalidArg);
    }

    let rec = &mut buf[..reclen];
    rec.fill(0);
    rec[0..8].copy_from_slice(&entry.ino.to_le_bytes());
    rec[8..10].copy_from_slice(&(reclen as u16).to_le_bytes());
    rec[10] = entry.kind.dirent_type();
    rec[11] = namelen as u8;
    rec[DIRENT_HEADER_LEN..DIRENT_HEADER_LEN + namelen]
        .copy_from_slice(&entry.name.as_bytes()[..namelen]);
    Ok(Some(reclen))
}

pub fn mkdir(cwd: &str, path: &str) -> VResult<()> {
    let fs = root_fs()?;
    let (dir, name) = resolve_parent(cwd, path)?;
    fs.mkdir(dir, &name)?;
    fs.sync();
    Ok(())
}

pub fn rmdir(cwd: &str, path: &str) -> VResult<()> {
    let fs = root_fs()?;
    let (dir, name) = resolve_parent(cwd, path)?;
    fs.rmdir(dir, &name)?;
    fs.sync();
    Ok(())
}

pub fn unlink(cwd: &str, path: &str) -> VResult<()> {
    let fs = root_fs()?;
    let (dir, name) = resolve_parent(cwd, path)?;
    fs.unlink(dir, &name)?;
    fs.sync();
    Ok(())
}

pub fn rename(cwd: &str, from: &str, to: &str) -> VResult<()> {
    let fs = root_fs()?;
    let (src_dir, src) = resolve_parent(cwd, from)?;
    let (dst_dir, dst) = resolve_parent(cwd, to)?;
    fs.rename(src_dir, &src, dst_dir, &dst)?;
    fs.sync();
    Ok(())
}

pub fn symlink(cwd: &str, target: &str, linkpath: &str) -> VResult<()> {
    let fs = root_fs()?;
    let (dir, name) = resolve_parent(cwd, linkpath)?;
    fs.symlink(dir, &name, target)?;
    fs.sync();
    Ok(())
}

pub fn readlink(cwd: &str, path: &str) -> VResult<String> {
    let fs = root_fs()?;
    // Resolve up to the link itself, not through it.
    let (dir, name) = resolve_parent(cwd, path)?;
    let ino = fs.lookup(dir, &name)?;
    fs.readlink(ino)
}

#[cfg(all(test, feature = "std"))]
pub(crate) mod testutil {
    use super::*;
    use crate::fs::ramfs::RamFs;

    /// Mount a RamFs root once per test process.
    pub fn ensure_root() {
        static READY: Once<()> = Once::new();
        READY.call_once(|| {
            mount_root(Arc::new(RamFs::new()));
        });
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::sched::task::testutil::sched_test_guard;
    use testutil::ensure_root;

    #[test]
    fn create_write_read_round_trip() {
        let _g = sched_test_guard();
        ensure_root();

        let (ino, kind) = open("/", "/vfs-a.txt", open_flags::O_CREAT).unwrap();
        assert_eq!(kind, NodeKind::File);
        assert_eq!(write_at(ino, 0, b"hello world").unwrap(), 11);

        let mut buf = [0u8; 32];
        let n = read_at(ino, 0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello world");

        // Offset read
        let n = read_at(ino, 6, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"world");

        let st = stat_ino(ino).unwrap();
        assert_eq!(st.size, 11);
        assert_eq!(st.ino, ino);
    }

    #[test]
    fn truncate_on_open() {
        let _g = sched_test_guard();
        ensure_root();

        let (ino, _) = open("/", "/vfs-trunc.txt", open_flags::O_CREAT).unwrap();
        write_at(ino, 0, b"data").unwrap();
        let (ino2, _) = open("/", "/vfs-trunc.txt", open_flags::O_TRUNC).unwrap();
        assert_eq!(ino, ino2);
        assert_eq!(stat_ino(ino).unwrap().size, 0);
    }

    #[test]
    fn relative_paths_resolve_against_cwd() {
        let _g = sched_test_guard();
        ensure_root();

        mkdir("/", "/vfs-rel").unwrap();
        let (ino, _) = open("/vfs-rel", "inner.txt", open_flags::O_CREAT).unwrap();
        assert_eq!(resolve("/", "/vfs-rel/inner.txt").unwrap(), ino);
        assert_eq!(resolve("/vfs-rel", "./inner.txt").unwrap(), ino);
        assert_eq!(resolve("/vfs-rel", "../vfs-rel/inner.txt").unwrap(), ino);
    }

    #[test]
    fn getdents_packs_aligned_records() {
        let _g = sched_test_guard();
        ensure_root();

        mkdir("/", "/vfs-dir").unwrap();
        open("/", "/vfs-dir/a", open_flags::O_CREAT).unwrap();
        open("/", "/vfs-dir/bb", open_flags::O_CREAT).unwrap();
        open("/", "/vfs-dir/ccc", open_flags::O_CREAT).unwrap();

        let dir = resolve("/", "/vfs-dir").unwrap();
        let mut buf = [0u8; 256];
        let (bytes, next) = getdents(dir, 0, &mut buf).unwrap();
        assert_eq!(next, 3);
        assert!(bytes > 0);
        assert_eq!(bytes % 8, 0);

        // Walk the records back out.
        let mut pos = 0;
        let mut names = Vec::new();
        while pos < bytes {
            let reclen = u16::from_le_bytes([buf[pos + 8], buf[pos + 9]]) as usize;
            let namelen = buf[pos + 11] as usize;
            let name =
                core::str::from_utf8(&buf[pos + DIRENT_HEADER_LEN..pos + DIRENT_HEADER_LEN + namelen])
                    .unwrap();
            names.push(String::from(name));
            assert_eq!(buf[pos + DIRENT_HEADER_LEN + namelen], 0);
            pos += reclen;
        }
        assert_eq!(names, vec!["a", "bb", "ccc"]);

        // Too-small buffer: no bytes, no progress.
        let mut tiny = [0u8; 8];
        let (bytes, next) = getdents(dir, 0, &mut tiny).unwrap();
        assert_eq!(bytes, 0);
        assert_eq!(next, 0);

        // Resume from an index.
        let (bytes, next) = getdents(dir, 2, &mut buf).unwrap();
        assert!(bytes > 0);
        assert_eq!(next, 3);
    }

    #[test]
    fn directory_mutators() {
        let _g = sched_test_guard();
        ensure_root();

        mkdir("/", "/vfs-mut").unwrap();
        mkdir("/", "/vfs-mut/sub").unwrap();
        open("/", "/vfs-mut/file", open_flags::O_CREAT).unwrap();

        // rmdir refuses non-empty directories
        assert_eq!(rmdir("/", "/vfs-mut"), Err(VError::Busy));
        rmdir("/", "/vfs-mut/sub").unwrap();

        rename("/", "/vfs-mut/file", "/vfs-mut/renamed").unwrap();
        assert!(resolve("/", "/vfs-mut/file").is_err());
        let ino = resolve("/", "/vfs-mut/renamed").unwrap();
        assert_ne!(ino, 0);

        unlink("/", "/vfs-mut/renamed").unwrap();
        assert_eq!(resolve("/", "/vfs-mut/renamed"), Err(VError::NotFound));
        rmdir("/", "/vfs-mut").unwrap();
    }

    #[test]
    fn symlinks_resolve_with_depth_limit() {
        let _g = sched_test_guard();
        ensure_root();

        mkdir("/", "/vfs-ln").unwrap();
        let (target, _) = open("/", "/vfs-ln/target", open_flags::O_CREAT).unwrap();
        symlink("/", "/vfs-ln/target", "/vfs-ln/link").unwrap();
        assert_eq!(resolve("/", "/vfs-ln/link").unwrap(), target);
        assert_eq!(readlink("/", "/vfs-ln/link").unwrap(), "/vfs-ln/target");

        // A loop must hit the depth cap, not hang.
        symlink("/", "/vfs-ln/loop-b", "/vfs-ln/loop-a").unwrap();
        symlink("/", "/vfs-ln/loop-a", "/vfs-ln/loop-b").unwrap();
        assert_eq!(resolve("/", "/vfs-ln/loop-a"), Err(VError::Io));
    }

    #[test]
    fn assign_qualified_paths() {
        let _g = sched_test_guard();
        ensure_root();

        mkdir("/", "/vfs-sys").unwrap();
        let (ino, _) = open("/", "/vfs-sys/cmd", open_flags::O_CREAT).unwrap();
        crate::assign::set("VSYS", "/vfs-sys").unwrap();
        assert_eq!(resolve("/", "VSYS:cmd").unwrap(), ino);
        crate::assign::remove("VSYS").unwrap();
    }
}
