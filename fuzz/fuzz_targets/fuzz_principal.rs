// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use libfuzzer_sys::fuzz_target;
use runas_rpc::engine_core::principal::Principal;

fuzz_target!(|data: &str| {
    let principal = Principal::new(data);
    if let Ok(short) = principal.short_name() {
        assert!(!short.as_str().is_empty());
        assert!(!short.as_str().contains('/'));
        assert!(!short.as_str().contains('@'));
    }
    let _ = principal.service_name();
});
