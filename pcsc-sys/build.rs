use std::env;

fn main() {
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();

    match target_os.as_str() {
        "windows" => {
            println!("cargo:rustc-link-lib=dylib=winscard");
        }
        "macos" | "ios" => {
            println!("cargo:rustc-link-lib=framework=PCSC");
        }
        _ => {
            if let Ok(dir) = env::var("PCSC_LIB_DIR") {
                println!("cargo:rustc-link-search=native={dir}");
                let name = env::var("PCSC_LIB_NAME").unwrap_or_else(|_| "pcsclite".to_string());
                println!("cargo:rustc-link-lib=dylib={name}");
            } else if pkg_config::probe_library("libpcsclite").is_err() {
                // Fall back to the conventional SONAME; pcsclite does not
                // always ship a .pc file.
                println!("cargo:rustc-link-lib=dylib=pcsclite");
            }
        }
    }
}
