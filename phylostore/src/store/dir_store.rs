use super::{check_range, BlockWriter, ReadOnlyStore};
use crate::layout::BLOCKS;
use anyhow::Context;
use std::{
    fs::{self, File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

/// A store that keeps each block in its own file below a directory.
///
/// Block names may contain `/`, which map to subdirectories. Files are opened per
/// operation, so a DirStore holds no open handles between calls.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Opens a store rooted at `root`. The directory is only created on the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> PathBuf {
        name.split('/').fold(self.root.clone(), |acc, x| acc.join(x))
    }

    fn create(&self, name: &str) -> anyhow::Result<File> {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        File::create(&path).with_context(|| format!("creating {}", path.display()))
    }
}

/// Absolute form of a path that may not exist yet. The existing part is canonicalized.
fn absolute(path: &Path) -> PathBuf {
    if let Ok(path) = fs::canonicalize(path) {
        return path;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if parent.as_os_str().is_empty() => {
            absolute(Path::new(".")).join(name)
        }
        (Some(parent), Some(name)) => absolute(parent).join(name),
        _ => path.to_path_buf(),
    }
}

/// Makes the entries of a directory durable
#[cfg(unix)]
fn sync_dir(dir: &Path) -> anyhow::Result<()> {
    File::open(dir)
        .and_then(|dir| dir.sync_all())
        .with_context(|| format!("syncing {}", dir.display()))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> anyhow::Result<()> {
    Ok(())
}

impl ReadOnlyStore for DirStore {
    fn get(&self, name: &str) -> anyhow::Result<Box<[u8]>> {
        let path = self.path(name);
        let data = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        Ok(data.into())
    }

    fn read_at(&self, name: &str, offset: u64, buf: &mut [u8]) -> anyhow::Result<()> {
        let path = self.path(name);
        let mut file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
        check_range(name, offset, buf.len(), file.metadata()?.len())?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn size(&self, name: &str) -> anyhow::Result<Option<u64>> {
        match fs::metadata(self.path(name)) {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl BlockWriter for DirStore {
    fn put(&self, name: &str, data: Vec<u8>) -> anyhow::Result<()> {
        let mut file = self.create(name)?;
        file.write_all(&data)?;
        file.sync_all()?;
        Ok(())
    }

    fn allocate(&self, name: &str, len: u64) -> anyhow::Result<()> {
        let file = self.create(name)?;
        file.set_len(len)?;
        Ok(())
    }

    fn write_at(&self, name: &str, offset: u64, data: &[u8]) -> anyhow::Result<()> {
        let path = self.path(name);
        let mut file = OpenOptions::new()
            .write(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        check_range(name, offset, data.len(), file.metadata()?.len())?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }

    fn remove(&self, name: &str) -> anyhow::Result<()> {
        let path = self.path(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
        }
    }

    fn sync(&self, name: &str) -> anyhow::Result<()> {
        let path = self.path(name);
        File::open(&path)
            .and_then(|file| file.sync_all())
            .with_context(|| format!("syncing {}", path.display()))?;
        match path.parent() {
            Some(parent) => sync_dir(parent),
            None => Ok(()),
        }
    }

    /// Removes the block files, and the subdirectories they leave empty. Other files below
    /// the root are left alone.
    fn clear(&self) -> anyhow::Result<()> {
        for name in &BLOCKS {
            self.remove(name)?;
        }
        for name in &BLOCKS {
            let dir = match self.path(name).parent() {
                Some(dir) if dir != self.root => dir.to_path_buf(),
                _ => continue,
            };
            let empty = match fs::read_dir(&dir) {
                Ok(mut entries) => entries.next().is_none(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => false,
                Err(e) => return Err(e).with_context(|| format!("reading {}", dir.display())),
            };
            if empty {
                fs::remove_dir(&dir).with_context(|| format!("removing {}", dir.display()))?;
            }
        }
        Ok(())
    }

    fn location(&self) -> String {
        format!("dir:{}", absolute(&self.root).display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("phylostore-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn blocks_in_files() -> anyhow::Result<()> {
        let dir = temp_dir("dir-store");
        let store = DirStore::new(&dir);
        assert_eq!(store.size("leaf_data/index")?, None);
        store.put("leaf_data/index", b"hello".to_vec())?;
        assert!(dir.join("leaf_data").join("index").is_file());
        assert_eq!(&*store.get("leaf_data/index")?, b"hello");
        store.allocate("leaf_data/alignment", 8)?;
        store.write_at("leaf_data/alignment", 4, b"xy")?;
        let mut buf = [1u8; 4];
        store.read_at("leaf_data/alignment", 3, &mut buf)?;
        assert_eq!(&buf, b"\0xy\0");
        assert!(store.write_at("leaf_data/alignment", 7, b"xy").is_err());
        assert_eq!(store.size("leaf_data")?, None);
        store.sync("leaf_data/alignment")?;
        assert!(store.sync("tree").is_err());
        store.remove("leaf_data/index")?;
        store.remove("leaf_data/index")?;
        assert_eq!(store.size("leaf_data/index")?, None);
        store.clear()?;
        assert!(!dir.join("leaf_data").exists());
        store.clear()?;
        fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn clear_keeps_other_files() -> anyhow::Result<()> {
        let dir = temp_dir("dir-store-clear");
        let store = DirStore::new(&dir);
        store.put("manifest", b"m".to_vec())?;
        store.put("leaf_data/index", b"i".to_vec())?;
        fs::write(dir.join("input.fasta"), b">A\nACGT\n")?;
        fs::write(dir.join("leaf_data").join("notes.txt"), b"keep")?;
        store.clear()?;
        assert_eq!(store.size("manifest")?, None);
        assert_eq!(store.size("leaf_data/index")?, None);
        assert!(dir.join("input.fasta").is_file());
        assert!(dir.join("leaf_data").join("notes.txt").is_file());
        fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn location_of_missing_dir() {
        let name = format!("phylostore-not-there-{}", std::process::id());
        let a = DirStore::new(&name).location();
        let b = DirStore::new(Path::new(".").join(&name)).location();
        assert_eq!(a, b);
        assert!(Path::new(a.trim_start_matches("dir:")).is_absolute());
    }
}
