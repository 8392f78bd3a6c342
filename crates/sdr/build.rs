fn main() {
    #[cfg(feature = "usrp")]
    {
        println!("cargo:rustc-link-lib=uhd");
    }
}
