//! Thin command-line driver over [`pagecache::Engine`], in the role
//! `original_source/app/app.cpp` plays over `lab2_*`; exercises the
//! cache from the shell. Not covered by the engine's own test suite.

use std::io::{Read, Write, stdin, stdout};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use pagecache::{CacheConfig, Engine, Whence};
use tracing::Level;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Block size in bytes.
    #[arg(long, default_value_t = CacheConfig::default().block_size)]
    block_size: usize,
    /// Maximum number of resident blocks.
    #[arg(long, default_value_t = CacheConfig::default().capacity)]
    capacity: usize,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write stdin to `path` starting at `offset`, then fsync.
    Write { path: String, offset: i64 },
    /// Read `count` bytes from `path` starting at `offset` to stdout.
    Read { path: String, offset: i64, count: usize },
    /// Round-trip: write stdin, fsync, then read it back and print it.
    Roundtrip { path: String, offset: i64 },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let cli = Cli::parse();
    let engine = Engine::new(CacheConfig { block_size: cli.block_size, capacity: cli.capacity });

    let result = match cli.command {
        Command::Write { path, offset } => write_stdin(&engine, &path, offset),
        Command::Read { path, offset, count } => read_to_stdout(&engine, &path, offset, count),
        Command::Roundtrip { path, offset } => roundtrip(&engine, &path, offset),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("cachedemo: {e}");
            ExitCode::FAILURE
        }
    }
}

fn write_stdin(engine: &Engine, path: &str, offset: i64) -> anyhow::Result<()> {
    let mut data = Vec::new();
    stdin().read_to_end(&mut data)?;

    let handle = engine.open(path)?;
    engine.lseek(handle, offset, Whence::Set)?;
    let mut written = 0;
    while written < data.len() {
        written += engine.write(handle, &data[written..])?;
    }
    engine.fsync(handle)?;
    engine.close(handle)?;
    Ok(())
}

fn read_to_stdout(engine: &Engine, path: &str, offset: i64, count: usize) -> anyhow::Result<()> {
    let handle = engine.open(path)?;
    engine.lseek(handle, offset, Whence::Set)?;

    let mut remaining = count;
    let mut buf = vec![0u8; engine.config().block_size];
    let mut out = stdout();
    while remaining > 0 {
        let n = engine.read(handle, &mut buf[..remaining.min(buf.len())])?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        remaining -= n;
    }
    engine.close(handle)?;
    Ok(())
}

fn roundtrip(engine: &Engine, path: &str, offset: i64) -> anyhow::Result<()> {
    let mut data = Vec::new();
    stdin().read_to_end(&mut data)?;

    let handle = engine.open(path)?;
    engine.lseek(handle, offset, Whence::Set)?;
    let mut written = 0;
    while written < data.len() {
        written += engine.write(handle, &data[written..])?;
    }
    engine.fsync(handle)?;

    engine.lseek(handle, offset, Whence::Set)?;
    let mut readback = vec![0u8; data.len()];
    let mut got = 0;
    while got < readback.len() {
        let n = engine.read(handle, &mut readback[got..])?;
        if n == 0 {
            break;
        }
        got += n;
    }
    engine.close(handle)?;

    stdout().write_all(&readback[..got])?;
    Ok(())
}
