use std::io::{BufReader, Read};
use std::process::{Command, Stdio};
use std::sync::mpsc;

use crate::error::{Error, Result};
use crate::log::BuildLog;

/// Run a collaborator command to completion, streaming its stdout and stderr
/// into the build log line by line. Blocks with no timeout.
pub fn run_logged(log: &BuildLog, mut cmd: Command) -> Result<()> {
    log.debug(format!("running: {}", describe(&cmd)));
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::msg(format!("failed to spawn {}: {e}", program(&cmd))))?;

    let (tx, rx) = mpsc::channel::<String>();
    let mut readers = Vec::new();
    if let Some(out) = child.stdout.take() {
        let tx = tx.clone();
        readers.push(std::thread::spawn(move || read_lines(out, tx)));
    }
    if let Some(err) = child.stderr.take() {
        let tx = tx.clone();
        readers.push(std::thread::spawn(move || read_lines(err, tx)));
    }
    drop(tx);

    for line in rx {
        log.command_output(&line);
    }
    for r in readers {
        let _ = r.join();
    }

    let status = child
        .wait()
        .map_err(|e| Error::msg(format!("wait failed for {}: {e}", program(&cmd))))?;
    if !status.success() {
        return Err(Error::msg(format!("{} failed: {status}", program(&cmd))));
    }
    Ok(())
}

/// Run a query command and return its stdout. Stderr is forwarded to the log.
pub fn capture(log: &BuildLog, mut cmd: Command) -> Result<String> {
    log.debug(format!("querying: {}", describe(&cmd)));
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|e| Error::msg(format!("failed to spawn {}: {e}", program(&cmd))))?;
    for line in String::from_utf8_lossy(&output.stderr).lines() {
        log.command_output(line);
    }
    if !output.status.success() {
        return Err(Error::msg(format!(
            "{} failed: {}",
            program(&cmd),
            output.status
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

pub fn describe(cmd: &Command) -> String {
    let mut out = program(cmd);
    for a in cmd.get_args() {
        out.push(' ');
        out.push_str(&a.to_string_lossy());
    }
    out
}

fn program(cmd: &Command) -> String {
    cmd.get_program().to_string_lossy().into_owned()
}

fn read_lines<R: Read>(reader: R, tx: mpsc::Sender<String>) {
    const MAX_PENDING_BYTES: usize = 16 * 1024;
    let mut r = BufReader::new(reader);
    let mut buf = [0u8; 8192];
    let mut pending = Vec::with_capacity(1024);

    loop {
        let n = match r.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for b in &buf[..n] {
            if *b == b'\n' || *b == b'\r' {
                if !pending.is_empty() {
                    let _ = tx.send(String::from_utf8_lossy(&pending).into_owned());
                    pending.clear();
                }
            } else {
                pending.push(*b);
                if pending.len() >= MAX_PENDING_BYTES {
                    let _ = tx.send(String::from_utf8_lossy(&pending).into_owned());
                    pending.clear();
                }
            }
        }
    }

    if !pending.is_empty() {
        let _ = tx.send(String::from_utf8_lossy(&pending).into_owned());
    }
}
