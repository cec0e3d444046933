//! Loader fuzz target: feed arbitrary text to the loader and the assembler.
//! Neither may panic; malformed input must surface as `Err` or diagnostics.
//! Build with: cargo fuzz run loader_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let s = match std::str::from_utf8(data) {
        Ok(x) => x,
        Err(_) => return,
    };
    if let Ok(document) = rfcproto::load_str(s) {
        let _ = rfcproto::assemble(&document, rfcproto::AssemblerOptions::default());
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run loader_fuzz");
}
