const GSTREAMER_FRAMEWORK_LIB: &str = "/Library/Frameworks/GStreamer.framework/Versions/1.0/lib";

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // The official macOS GStreamer installer ships a framework, not pkg-config libs.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("macos") {
        println!("cargo:rustc-link-search=framework=/Library/Frameworks");
        println!("cargo:rustc-link-arg=-Wl,-rpath,{GSTREAMER_FRAMEWORK_LIB}");
    }
}
