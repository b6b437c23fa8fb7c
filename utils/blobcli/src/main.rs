use std::fs;
use std::path::PathBuf;

use blobtree::{BlockId, BlockStore, BlobStore, Error, HEADER_SIZE_BYTES, Result};
use clap::{Parser, Subcommand};

/// A directory-backed `BlockStore`: one file per block, named by the
/// block's hex-encoded id. Demo/manual-poking only; no encryption, no
/// integrity checking, no crash safety.
struct DirectoryBlockStore {
    dir: PathBuf,
    block_size_bytes: u64,
}

impl DirectoryBlockStore {
    fn open(dir: PathBuf, block_size_bytes: u64) -> std::io::Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            block_size_bytes,
        })
    }

    fn path_for(&self, id: &BlockId) -> PathBuf {
        self.dir.join(id.to_string())
    }

    fn check_size(&self, content: &[u8]) -> Result<()> {
        if content.len() as u64 != self.block_size_bytes {
            return Err(Error::InvariantViolation(format!(
                "block content is {} bytes, expected {}",
                content.len(),
                self.block_size_bytes
            )));
        }
        Ok(())
    }
}

impl BlockStore for DirectoryBlockStore {
    fn num_blocks(&self) -> u64 {
        fs::read_dir(&self.dir).map(|d| d.count() as u64).unwrap_or(0)
    }

    fn estimate_num_free_blocks(&self) -> u64 {
        u64::MAX
    }

    fn block_size_bytes(&self) -> u64 {
        self.block_size_bytes
    }

    fn create(&self, content: &[u8]) -> Result<BlockId> {
        self.check_size(content)?;
        let id = BlockId::new_random();
        fs::write(self.path_for(&id), content).map_err(|e| Error::BlockStore(e.to_string()))?;
        Ok(id)
    }

    fn try_create(&self, id: &BlockId, content: &[u8]) -> Result<bool> {
        self.check_size(content)?;
        let path = self.path_for(id);
        if path.exists() {
            return Ok(false);
        }
        fs::write(path, content).map_err(|e| Error::BlockStore(e.to_string()))?;
        Ok(true)
    }

    fn load(&self, id: &BlockId) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(id)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::BlockStore(e.to_string())),
        }
    }

    fn overwrite(&self, id: &BlockId, new_content: &[u8]) -> Result<()> {
        self.check_size(new_content)?;
        let path = self.path_for(id);
        if !path.exists() {
            return Err(Error::NotFound(*id));
        }
        fs::write(path, new_content).map_err(|e| Error::BlockStore(e.to_string()))
    }

    fn remove(&self, id: &BlockId) -> Result<bool> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path).map_err(|e| Error::BlockStore(e.to_string()))?;
        Ok(true)
    }

    fn for_each_block(&self, callback: &mut dyn FnMut(&BlockId)) -> Result<()> {
        let entries = fs::read_dir(&self.dir).map_err(|e| Error::BlockStore(e.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::BlockStore(e.to_string()))?;
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(id) = name.parse::<BlockId>() {
                    callback(&id);
                }
            }
        }
        Ok(())
    }
}

/// Exercises the blob-on-blocks library against a directory-backed block
/// store, one file per block.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding one file per block
    #[arg(short, long, default_value = "./blobtree-store")]
    dir: PathBuf,

    /// Block size in bytes, including the 8-byte header
    #[arg(long, default_value_t = 4096 + HEADER_SIZE_BYTES)]
    block_size: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates a new, empty blob and prints its id
    Create,
    /// Writes the content of a file into a blob at the given offset
    Write {
        id: BlockId,
        offset: u64,
        file: PathBuf,
    },
    /// Reads `count` bytes from a blob at the given offset, printing them as hex
    Read { id: BlockId, offset: u64, count: u64 },
    /// Resizes a blob, zero-filling or truncating as needed
    Resize { id: BlockId, size: u64 },
    /// Prints a blob's id, size, and node count
    Stat { id: BlockId },
    /// Deletes a blob and every block it owns
    Rm { id: BlockId },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let block_store = DirectoryBlockStore::open(args.dir, args.block_size)?;
    let store = BlobStore::new(block_store)?;

    match args.command {
        Command::Create => {
            let blob = store.create()?;
            println!("{}", blob.id());
        }
        Command::Write { id, offset, file } => {
            let blob = store
                .load(id)?
                .ok_or(Error::NotFound(id))?;
            let data = fs::read(file)?;
            blob.write(&data, offset)?;
        }
        Command::Read { id, offset, count } => {
            let blob = store
                .load(id)?
                .ok_or(Error::NotFound(id))?;
            let mut buf = vec![0u8; count as usize];
            let read = blob.try_read(&mut buf, offset, count)?;
            buf.truncate(read as usize);
            println!("{}", buf.iter().map(|b| format!("{b:02x}")).collect::<String>());
        }
        Command::Resize { id, size } => {
            let blob = store
                .load(id)?
                .ok_or(Error::NotFound(id))?;
            blob.resize(size)?;
        }
        Command::Stat { id } => {
            let blob = store
                .load(id)?
                .ok_or(Error::NotFound(id))?;
            println!("id:    {}", blob.id());
            println!("size:  {}", blob.size()?);
            println!("nodes: {}", blob.num_nodes()?);
        }
        Command::Rm { id } => {
            let blob = store
                .load(id)?
                .ok_or(Error::NotFound(id))?;
            store.remove(blob)?;
        }
    }

    Ok(())
}
