//! RAM-backed file system.
//!
//! Boot file system and test double for the VFS seam: nodes live in a
//! vector, data in `Vec<u8>`, directories as name → inode lists. Inode
//! numbers are `index + 1` and stay valid for the life of the node.

use super::vfs::{DirEntry, FileSystem, NodeKind};
use crate::time::tick;
use alloc::string::String;
use alloc::vec::Vec;
use viper_abi::{Stat, VError, VResult};
use viper_hal::IrqSafeLock;

struct Node {
    kind: NodeKind,
    data: Vec<u8>,
    children: Vec<(String, u64)>,
    link_target: String,
    /// Unlinked nodes keep their slot (inode stability) but are dead.
    alive: bool,
    atime: u64,
    mtime: u64,
    ctime: u64,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        let now = tick::get_ticks();
        Self {
            kind,
            data: Vec::new(),
            children: Vec::new(),
            link_target: String::new(),
            alive: true,
            atime: now,
            mtime: now,
            ctime: now,
        }
    }
}

pub struct RamFs {
    nodes: IrqSafeLock<Vec<Node>>,
}

impl RamFs {
    pub fn new() -> Self {
        let root = Node::new(NodeKind::Directory);
        Self {
            nodes: IrqSafeLock::new(alloc::vec![root]),
        }
    }

    fn index(ino: u64) -> VResult<usize> {
        if ino == 0 {
            return Err(VError::InvalidArg);
        }
        Ok((ino - 1) as usize)
    }

    fn alloc_node(nodes: &mut Vec<Node>, kind: NodeKind) -> u64 {
        nodes.push(Node::new(kind));
        nodes.len() as u64
    }

    fn child_of(nodes: &[Node], dir: usize, name: &str) -> VResult<u64> {
        let d = nodes.get(dir).filter(|n| n.alive).ok_or(VError::NotFound)?;
        if d.kind != NodeKind::Directory {
            return Err(VError::InvalidArg);
        }
        d.children
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ino)| *ino)
            .ok_or(VError::NotFound)
    }

    fn insert_child(
        nodes: &mut Vec<Node>,
        dir: usize,
        name: &str,
        kind: NodeKind,
    ) -> VResult<u64> {
        if name.is_empty() || name.contains('/') {
            return Err(VError::InvalidArg);
        }
        if Self::child_of(nodes, dir, name).is_ok() {
            return Err(VError::Exists);
        }
        let ino = Self::alloc_node(nodes, kind);
        let d = nodes.get_mut(dir).ok_or(VError::NotFound)?;
        d.children.push((String::from(name), ino));
        d.mtime = tick::get_ticks();
        Ok(ino)
    }
}

impl Default for RamFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for RamFs {
    fn root(&self) -> u64 {
        1
    }

    fn lookup(&self, dir: u64, name: &str) -> VResult<u64> {
        let nodes = self.nodes.lock();
        Self::child_of(&nodes, Self::index(dir)?, name)
    }

    fn node_kind(&self, ino: u64) -> VResult<NodeKind> {
        let nodes = self.nodes.lock();
        nodes
            .get(Self::index(ino)?)
            .filter(|n| n.alive)
            .map(|n| n.kind)
            .ok_or(VError::NotFound)
    }

    fn create(&self, dir: u64, name: &str) -> VResult<u64> {
        let mut nodes = self.nodes.lock();
        Self::insert_child(&mut nodes, Self::index(dir)?, name, NodeKind::File)
    }

    fn read(&self, ino: u64, offset: u64, buf: &mut [u8]) -> VResult<usize> {
        let mut nodes = self.nodes.lock();
        let node = nodes
            .get_mut(Self::index(ino)?)
            .filter(|n| n.alive)
            .ok_or(VError::NotFound)?;
        if node.kind != NodeKind::File {
            return Err(VError::InvalidArg);
        }

        let offset = offset as usize;
        if offset >= node.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(node.data.len() - offset);
        buf[..n].copy_from_slice(&node.data[offset..offset + n]);
        node.atime = tick::get_ticks();
        Ok(n)
    }

    fn write(&self, ino: u64, offset: u64, data: &[u8]) -> VResult<usize> {
        let mut nodes = self.nodes.lock();
        let node = nodes
            .get_mut(Self::index(ino)?)
            .filter(|n| n.alive)
            .ok_or(VError::NotFound)?;
        if node.kind != NodeKind::File {
            return Err(VError::InvalidArg);
        }

        let offset = offset as usize;
        let end = offset + data.len();
        if node.data.len() < end {
            node.data.resize(end, 0);
        }
        node.data[offset..end].copy_from_slice(data);
        node.mtime = tick::get_ticks();
        Ok(data.len())
    }

    fn truncate(&self, ino: u64) -> VResult<()> {
        let mut nodes = self.nodes.lock();
        let node = nodes
            .get_mut(Self::index(ino)?)
            .filter(|n| n.alive)
            .ok_or(VError::NotFound)?;
        if node.kind != NodeKind::File {
            return Err(VError::InvalidArg);
        }
        node.data.clear();
        node.mtime = tick::get_ticks();
        Ok(())
    }

    fn stat(&self, ino: u64) -> VResult<Stat> {
        let nodes = self.nodes.lock();
        let node = nodes
            .get(Self::index(ino)?)
            .filter(|n| n.alive)
            .ok_or(VError::NotFound)?;

        let mode = match node.kind {
            NodeKind::File => 0o100_644,
            NodeKind::Directory => 0o040_755,
            NodeKind::Symlink => 0o120_777,
        };
        let size = match node.kind {
            NodeKind::File => node.data.len() as u64,
            NodeKind::Directory => node.children.len() as u64,
            NodeKind::Symlink => node.link_target.len() as u64,
        };
        Ok(Stat {
            ino,
            mode,
            _pad: 0,
            size,
            blocks: size.div_ceil(512),
            atime: node.atime,
            mtime: node.mtime,
            ctime: node.ctime,
        })
    }

    fn read_dir(&self, dir: u64, index: usize) -> VResult<Option<DirEntry>> {
        let nodes = self.nodes.lock();
        let d = nodes
            .get(Self::index(dir)?)
            .filter(|n| n.alive)
            .ok_or(VError::NotFound)?;
        if d.kind != NodeKind::Directory {
            return Err(VError::InvalidArg);
        }

        Ok(d.children.get(index).map(|(name, ino)| {
            let kind = nodes
                .get((*ino - 1) as usize)
                .map(|n| n.kind)
                .unwrap_or(NodeKind::File);
            DirEntry {
                ino: *ino,
                kind,
                name: name.clone(),
            }
        }))
    }

    fn mkdir(&self, dir: u64, name: &str) -> VResult<u64> {
        let mut nodes = self.nodes.lock();
        Self::insert_child(&mut nodes, Self::index(dir)?, name, NodeKind::Directory)
    }

    fn rmdir(&self, dir: u64, name: &str) -> VResult<()> {
        let mut nodes = self.nodes.lock();
        let dir_idx = Self::index(dir)?;
        let ino = Self::child_of(&nodes, dir_idx, name)?;
        let idx = Self::index(ino)?;

        let victim = nodes.get(idx).ok_or(VError::NotFound)?;
        if victim.kind != NodeKind::Directory {
            return Err(VError::InvalidArg);
        }
        if !victim.children.is_empty() {
            return Err(VError::Busy);
        }

        nodes[idx].alive = false;
        let d = &mut nodes[dir_idx];
        d.children.retain(|(n, _)| n != name);
        d.mtime = tick::get_ticks();
        Ok(())
    }

    fn unlink(&self, dir: u64, name: &str) -> VResult<()> {
        let mut nodes = self.nodes.lock();
        let dir_idx = Self::index(dir)?;
        let ino = Self::child_of(&nodes, dir_idx, name)?;
        let idx = Self::index(ino)?;

        let victim = nodes.get(idx).ok_or(VError::NotFound)?;
        if victim.kind == NodeKind::Directory {
            return Err(VError::InvalidArg);
        }

        nodes[idx].alive = false;
        let d = &mut nodes[dir_idx];
        d.children.retain(|(n, _)| n != name);
        d.mtime = tick::get_ticks();
        Ok(())
    }

    fn rename(&self, src_dir: u64, src: &str, dst_dir: u64, dst: &str) -> VResult<()> {
        let mut nodes = self.nodes.lock();
        let src_idx = Self::index(src_dir)?;
        let dst_idx = Self::index(dst_dir)?;

        let ino = Self::child_of(&nodes, src_idx, src)?;
        if Self::child_of(&nodes, dst_idx, dst).is_ok() {
            return Err(VError::Exists);
        }
        if dst.is_empty() || dst.contains('/') {
            return Err(VError::InvalidArg);
        }

        nodes[src_idx].children.retain(|(n, _)| n != src);
        nodes[src_idx].mtime = tick::get_ticks();
        nodes[dst_idx].children.push((String::from(dst), ino));
        nodes[dst_idx].mtime = tick::get_ticks();
        Ok(())
    }

    fn symlink(&self, dir: u64, name: &str, target: &str) -> VResult<u64> {
        let mut nodes = self.nodes.lock();
        let ino = Self::insert_child(&mut nodes, Self::index(dir)?, name, NodeKind::Symlink)?;
        let idx = Self::index(ino)?;
        nodes[idx].link_target = String::from(target);
        Ok(ino)
    }

    fn readlink(&self, ino: u64) -> VResult<String> {
        let nodes = self.nodes.lock();
        let node = nodes
            .get(Self::index(ino)?)
            .filter(|n| n.alive)
            .ok_or(VError::NotFound)?;
        if node.kind != NodeKind::Symlink {
            return Err(VError::InvalidArg);
        }
        Ok(node.link_target.clone())
    }

    fn sync(&self) {
        // Memory-backed; nothing to flush.
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn root_is_an_empty_directory() {
        let fs = RamFs::new();
        assert_eq!(fs.node_kind(fs.root()).unwrap(), NodeKind::Directory);
        assert!(fs.read_dir(fs.root(), 0).unwrap().is_none());
    }

    #[test]
    fn create_and_lookup() {
        let fs = RamFs::new();
        let f = fs.create(fs.root(), "file").unwrap();
        assert_eq!(fs.lookup(fs.root(), "file").unwrap(), f);
        assert_eq!(fs.create(fs.root(), "file"), Err(VError::Exists));
        assert_eq!(fs.lookup(fs.root(), "other"), Err(VError::NotFound));
        assert_eq!(fs.create(fs.root(), "a/b"), Err(VError::InvalidArg));
    }

    #[test]
    fn write_extends_and_read_honors_offsets() {
        let fs = RamFs::new();
        let f = fs.create(fs.root(), "data").unwrap();
        fs.write(f, 0, b"abc").unwrap();
        // Sparse write: gap is zero-filled.
        fs.write(f, 5, b"xyz").unwrap();

        let mut buf = [0u8; 16];
        let n = fs.read(f, 0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"abc\0\0xyz");
        assert_eq!(fs.read(f, 100, &mut buf).unwrap(), 0);
    }

    #[test]
    fn unlinked_inode_goes_dead() {
        let fs = RamFs::new();
        let f = fs.create(fs.root(), "gone").unwrap();
        fs.unlink(fs.root(), "gone").unwrap();
        assert_eq!(fs.node_kind(f), Err(VError::NotFound));
        assert_eq!(fs.stat(f), Err(VError::NotFound));
        // The name is free again.
        fs.create(fs.root(), "gone").unwrap();
    }

    #[test]
    fn rmdir_semantics() {
        let fs = RamFs::new();
        let d = fs.mkdir(fs.root(), "dir").unwrap();
        fs.create(d, "child").unwrap();
        assert_eq!(fs.rmdir(fs.root(), "dir"), Err(VError::Busy));
        fs.unlink(d, "child").unwrap();
        fs.rmdir(fs.root(), "dir").unwrap();
        assert_eq!(fs.lookup(fs.root(), "dir"), Err(VError::NotFound));
        // unlink refuses directories
        let d2 = fs.mkdir(fs.root(), "dir2").unwrap();
        let _ = d2;
        assert_eq!(fs.unlink(fs.root(), "dir2"), Err(VError::InvalidArg));
    }

    #[test]
    fn rename_moves_between_directories() {
        let fs = RamFs::new();
        let a = fs.mkdir(fs.root(), "a").unwrap();
        let b = fs.mkdir(fs.root(), "b").unwrap();
        let f = fs.create(a, "f").unwrap();

        fs.rename(a, "f", b, "g").unwrap();
        assert_eq!(fs.lookup(a, "f"), Err(VError::NotFound));
        assert_eq!(fs.lookup(b, "g").unwrap(), f);

        // Destination collision
        fs.create(b, "h").unwrap();
        assert_eq!(fs.rename(b, "g", b, "h"), Err(VError::Exists));
    }

    #[test]
    fn stat_reports_kind_and_size() {
        let fs = RamFs::new();
        let f = fs.create(fs.root(), "s").unwrap();
        fs.write(f, 0, &[0u8; 1000]).unwrap();
        let st = fs.stat(f).unwrap();
        assert_eq!(st.size, 1000);
        assert_eq!(st.blocks, 2);
        assert_eq!(st.mode & 0o170_000, 0o100_000);

        let d = fs.mkdir(fs.root(), "d").unwrap();
        assert_eq!(fs.stat(d).unwrap().mode & 0o170_000, 0o040_000);
    }
}
