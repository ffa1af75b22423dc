//! Inspect a romfs image from the command line.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{debug, warn};
use memmap2::Mmap;
use serde::Serialize;

use romfs::{
    layout::decode_node_header, DirEntry, Fd, MountOptions, OpenFlags, Romfs, RomfsError,
    RomfsFileType, RomfsStat,
};

#[derive(Debug, Parser)]
#[command(version, about = "Read-only romfs image inspector", long_about = None)]
struct Cli {
    /// Image file to mount.
    image: PathBuf,

    /// Reject the image unless the volume and root checksums are valid.
    #[arg(long)]
    verify: bool,

    /// Emit JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Log every lookup and descriptor operation.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the volume header.
    Info,
    /// List a directory.
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Copy a file to stdout.
    Cat { path: String },
    /// Show node metadata.
    Stat { path: String },
    /// Print the whole hierarchy below a directory.
    Tree {
        #[arg(default_value = "/")]
        path: String,
    },
}

#[derive(Serialize)]
struct VolumeInfo {
    name: String,
    size: u32,
    checksum: u32,
    checksum_ok: bool,
    root_offset: u32,
}

#[derive(Serialize)]
struct ListEntry<'img> {
    #[serde(flatten)]
    entry: DirEntry<'img>,
    size: u32,
}

#[derive(Serialize)]
struct TreeNode {
    name: String,
    #[serde(flatten)]
    stat: RomfsStat,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<TreeNode>,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "trace" } else { "warn" };
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or(default_level));
    builder.format_timestamp(None);
    let _ = builder.try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let file = File::open(&cli.image)
        .with_context(|| format!("failed to open {}", cli.image.display()))?;
    // SAFETY: the image is only ever read, and the tool holds the mapping
    // for its whole run.
    let map = unsafe { Mmap::map(&file) }
        .with_context(|| format!("failed to map {}", cli.image.display()))?;
    debug!("mapped {} bytes from {}", map.len(), cli.image.display());

    let opts = MountOptions {
        verify_checksum: cli.verify,
    };
    let mut fs = Romfs::load_with_options(&map, &opts)
        .with_context(|| format!("{} is not a usable romfs image", cli.image.display()))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match &cli.command {
        Command::Info => info(&fs, cli.json, &mut out)?,
        Command::Ls { path } => ls(&mut fs, path, cli.json, &mut out)?,
        Command::Cat { path } => cat(&mut fs, path, &mut out)?,
        Command::Stat { path } => {
            let stat = fs
                .fd_stat_at(Fd::ROOT, path)
                .with_context(|| format!("cannot stat {}", path))?;
            if cli.json {
                writeln!(out, "{}", serde_json::to_string_pretty(&stat)?)?;
            } else {
                print_stat(&mut out, path, &stat)?;
            }
        }
        Command::Tree { path } => {
            let root = tree(&mut fs, path, path.clone())?;
            if cli.json {
                writeln!(out, "{}", serde_json::to_string_pretty(&root)?)?;
            } else {
                print_tree(&mut out, &root, 0)?;
            }
        }
    }

    fs.unload();
    Ok(())
}

fn info(fs: &Romfs<'_>, json: bool, out: &mut impl Write) -> Result<()> {
    let vol = fs.volume();
    let checksum_ok = vol.verify_checksum(fs.image()).is_ok();
    if !checksum_ok {
        warn!("volume checksum does not match");
    }
    let info = VolumeInfo {
        name: vol.name_lossy().into_owned(),
        size: vol.size,
        checksum: vol.checksum,
        checksum_ok,
        root_offset: vol.root_offset,
    };

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&info)?)?;
    } else {
        writeln!(out, "volume:      {}", info.name)?;
        writeln!(out, "size:        {} bytes", info.size)?;
        writeln!(
            out,
            "checksum:    {:#010x} ({})",
            info.checksum,
            if checksum_ok { "ok" } else { "BAD" }
        )?;
        writeln!(out, "root offset: {:#x}", info.root_offset)?;
    }
    Ok(())
}

/// Open `path` as a directory and collect its entries, releasing the
/// descriptor before returning.
fn list_dir<'img>(fs: &mut Romfs<'img>, path: &str) -> Result<Vec<DirEntry<'img>>> {
    let fd = fs
        .open_root(path, OpenFlags::DIRECTORY)
        .with_context(|| format!("cannot open directory {}", path))?;
    let entries = fs.dir_entries(fd);
    fs.close(fd)?;
    Ok(entries?)
}

fn ls(fs: &mut Romfs<'_>, path: &str, json: bool, out: &mut impl Write) -> Result<()> {
    let entries = list_dir(fs, path)?;
    let vol = *fs.volume();
    let img = fs.image();
    let listed = entries
        .into_iter()
        .map(|entry| {
            let size = decode_node_header(&vol, img, entry.inode)?.size;
            Ok::<_, RomfsError>(ListEntry { entry, size })
        })
        .collect::<Result<Vec<_>, RomfsError>>()?;

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&listed)?)?;
        return Ok(());
    }
    for ListEntry { entry, size } in &listed {
        let exec = if entry.mode.is_exec() { 'x' } else { '-' };
        writeln!(
            out,
            "{}{} {:>8} {:#08x} {}",
            entry.file_type().as_char(),
            exec,
            size,
            entry.inode,
            entry.name_lossy()
        )?;
    }
    Ok(())
}

fn cat(fs: &mut Romfs<'_>, path: &str, out: &mut impl Write) -> Result<()> {
    let fd = fs
        .open_root(path, OpenFlags::empty())
        .with_context(|| format!("cannot open {}", path))?;
    let stat = fs.fd_stat(fd)?;
    if stat.file_type() != RomfsFileType::RegularFile {
        fs.close(fd)?;
        bail!("{} is not a regular file", path);
    }

    let mut buf = [0u8; 4096];
    loop {
        let n = fs.read(fd, &mut buf)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
    }
    fs.close(fd)?;
    Ok(())
}

fn print_stat(out: &mut impl Write, path: &str, stat: &RomfsStat) -> Result<()> {
    writeln!(out, "  path: {}", path)?;
    writeln!(out, " inode: {:#x}", stat.ino)?;
    writeln!(
        out,
        "  type: {:?}{}",
        stat.file_type(),
        if stat.mode.is_exec() { " (executable)" } else { "" }
    )?;
    writeln!(out, "  size: {}", stat.size)?;
    writeln!(out, "  csum: {:#010x}", stat.checksum)?;
    match stat.device() {
        Some((major, minor)) => writeln!(out, "device: {}:{}", major, minor)?,
        None => writeln!(out, "  info: {:#x}", stat.info)?,
    }
    Ok(())
}

fn join(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Walk the hierarchy below `path`. Hardlinks, `.` and `..` are listed but
/// not descended into, so every directory is visited once.
fn tree(fs: &mut Romfs<'_>, path: &str, name: String) -> Result<TreeNode> {
    let stat = fs
        .fd_stat_at(Fd::ROOT, path)
        .with_context(|| format!("cannot stat {}", path))?;
    let mut node = TreeNode {
        name,
        stat,
        children: Vec::new(),
    };
    if !stat.mode.is_dir() {
        return Ok(node);
    }

    for entry in list_dir(fs, path)? {
        let child_name = entry.name_lossy().into_owned();
        if child_name == "." || child_name == ".." {
            continue;
        }
        let child_path = join(path, &child_name);
        if entry.file_type() == RomfsFileType::Directory {
            node.children.push(tree(fs, &child_path, child_name)?);
        } else {
            let stat = fs
                .fd_stat_at(Fd::ROOT, &child_path)
                .or_else(|err| match err {
                    // a hardlink cycle still gets listed
                    RomfsError::LinkLoop => Ok(RomfsStat {
                        ino: entry.inode,
                        mode: entry.mode,
                        size: 0,
                        checksum: 0,
                        info: 0,
                    }),
                    err => Err(err),
                })
                .with_context(|| format!("cannot stat {}", child_path))?;
            node.children.push(TreeNode {
                name: child_name,
                stat,
                children: Vec::new(),
            });
        }
    }
    Ok(node)
}

fn print_tree(out: &mut impl Write, node: &TreeNode, depth: usize) -> Result<()> {
    let suffix = if node.stat.mode.is_dir() { "/" } else { "" };
    writeln!(out, "{:indent$}{}{}", "", node.name, suffix, indent = depth * 4)?;
    for child in &node.children {
        print_tree(out, child, depth + 1)?;
    }
    Ok(())
}
