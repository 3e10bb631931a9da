mod common;

use std::fs;

use isotree::ErrorKind;
use isotree::config;
use isotree::log::Level;

use common::{FakeHost, Sandbox};

#[test]
fn config_file_on_disk_feeds_the_orchestrator() {
    let sb = Sandbox::new();
    let path = sb.path("isotree.toml");
    let ignore = sb.path("ignorelist");
    fs::write(
        &path,
        format!(
            "[isotree]\nsharedir = \"{}\"\n\n[output]\nignorelist = \"{}\"\n\n[compression]\ntype = \"gzip\"\nspeed = 6\n",
            sb.path("share").display(),
            ignore.display()
        ),
    )
    .expect("write config");
    fs::write(&ignore, "# noise from scriptlets\n^warning: .* created as .*\\.rpmnew$\n").expect("write ignorelist");

    let cfg = config::load(&path).expect("load").build().expect("build");
    assert_eq!(cfg.compression().kind, "gzip");
    assert_eq!(cfg.compression().speed, 6);
    assert_eq!(cfg.ramdisk_template(), sb.path("share/ramdisk.tmpl"));

    let mut orch = sb.orchestrator(FakeHost::default(), sb.builders());
    orch.configure(cfg).expect("configure");

    sb.log
        .command_output("warning: /etc/shadow created as /etc/shadow.rpmnew");
    sb.log.command_output("Installing: bash-5.2-1.x86_64");
    assert_eq!(
        sb.sink.messages(Level::Debug).last().map(String::as_str),
        Some("Installing: bash-5.2-1.x86_64")
    );
    assert!(
        !sb.sink
            .messages(Level::Debug)
            .iter()
            .any(|m| m.contains("rpmnew"))
    );
}

#[test]
fn bad_ignore_pattern_fails_configure() {
    let sb = Sandbox::new();
    let ignore = sb.path("ignorelist");
    fs::write(&ignore, "([unclosed\n").expect("write ignorelist");
    let cfg = config::Config::builder()
        .ignorelist(&ignore)
        .build()
        .expect("build");

    let mut orch = sb.orchestrator(FakeHost::default(), sb.builders());
    let err = orch.configure(cfg).expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn malformed_config_file_is_a_config_error() {
    let sb = Sandbox::new();
    let path = sb.path("isotree.toml");
    fs::write(&path, "[compression\ntype = xz\n").expect("write config");
    let err = config::load(&path).expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::Config);
}
