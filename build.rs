fn main() {
    // macOS: CoreBluetooth refuses to scan from a binary that carries no
    // Info.plist with NSBluetoothAlwaysUsageDescription.  CLI tools embed one
    // in the __TEXT,__info_plist section via the linker.
    //
    // CARGO_CFG_TARGET_OS is the target, so cross builds are covered too.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("macos")
        && std::env::var_os("CARGO_FEATURE_BLE").is_some()
    {
        let Ok(dir) = std::env::var("CARGO_MANIFEST_DIR") else {
            return;
        };
        let plist = format!("{dir}/Info.plist");

        println!("cargo:rustc-link-arg-bins=-sectcreate");
        println!("cargo:rustc-link-arg-bins=__TEXT");
        println!("cargo:rustc-link-arg-bins=__info_plist");
        println!("cargo:rustc-link-arg-bins={plist}");
        println!("cargo:rerun-if-changed=Info.plist");
    }
}
