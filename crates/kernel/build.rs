use std::env;

fn main() {
    let target_arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();

    if target_arch == "aarch64" {
        cc::Build::new()
            .file("src/arch/aarch64/boot.S")
            .file("src/arch/aarch64/vectors.S")
            .file("src/arch/aarch64/context.S")
            .compile("viper-arch");

        println!("cargo:rerun-if-changed=src/arch/aarch64/boot.S");
        println!("cargo:rerun-if-changed=src/arch/aarch64/vectors.S");
        println!("cargo:rerun-if-changed=src/arch/aarch64/context.S");
        println!("cargo:rerun-if-changed=src/arch/aarch64/linker.ld");
        println!(
            "cargo:rustc-link-arg-bins=-T{}/src/arch/aarch64/linker.ld",
            env::var("CARGO_MANIFEST_DIR").unwrap()
        );
    }
}
