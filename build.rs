// 构建脚本: 静态链接 FFmpeg 时补充系统库 (ez-ffmpeg "static" 特性)
fn main() {
    #[cfg(all(target_os = "windows", target_env = "msvc"))]
    {
        // x264 编码器
        println!("cargo:rustc-link-lib=dylib=libx264");

        // OLE 自动化和VFW
        println!("cargo:rustc-link-lib=dylib=oleaut32");
        println!("cargo:rustc-link-lib=dylib=vfw32");

        // Secure Channel (TLS/SSL)
        println!("cargo:rustc-link-lib=dylib=secur32");
    }
}
