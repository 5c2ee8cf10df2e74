#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use runas_rpc::engine_core::principal::Principal;
use runas_rpc::identity::keytab::Keytab;
use runas_rpc::identity::login::LoginIdentity;

pub const REALM: &str = "EXAMPLE.COM";
pub const SERVER_PRINCIPAL: &str = "runas/localhost@EXAMPLE.COM";

/// Deterministic per-principal key.
pub fn key_for(principal: &str) -> Vec<u8> {
    let seed = principal.bytes().fold(7u8, |acc, b| acc.wrapping_mul(31).wrapping_add(b));
    (0..32u8).map(|i| seed.wrapping_add(i)).collect()
}

pub fn login(principal: &str, known: &[&str]) -> Arc<LoginIdentity> {
    let mut entries = vec![(Principal::new(principal), key_for(principal))];
    entries.extend(known.iter().map(|p| (Principal::new(*p), key_for(p))));
    let keytab = Keytab::from_entries(entries).unwrap();
    Arc::new(LoginIdentity::new(Principal::new(principal), Arc::new(keytab)).unwrap())
}

pub fn server_login(clients: &[&str]) -> Arc<LoginIdentity> {
    login(SERVER_PRINCIPAL, clients)
}

/// Keytab YAML file holding `principals`, each with its deterministic key.
pub fn write_keytab(dir: &Path, name: &str, principals: &[&str]) -> PathBuf {
    let mut yaml = String::from("entries:\n");
    for p in principals {
        yaml.push_str(&format!("  - principal: {}\n    key: {}\n", p, hex::encode(key_for(p))));
    }
    let path = dir.join(name);
    std::fs::write(&path, yaml).unwrap();
    path
}
