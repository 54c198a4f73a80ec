fn main() {
    println!("cargo:rerun-if-env-changed=DEVBRIDGE_CONFIG_JSON");

    // ESP-IDF link arguments are only needed for the firmware build.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
