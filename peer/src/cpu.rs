//! CPU feature probing for cipher selection.

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod aes {
    cpufeatures::new!(cpuid_aes, "aes");

    pub fn detect() -> bool {
        cpuid_aes::get()
    }
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
mod aes {
    pub fn detect() -> bool {
        false
    }
}

/// Whether the CPU provides AES acceleration (AES-NI). Peers without it
/// never advertise or pick AES-256-GCM; ChaCha20-Poly1305 is always
/// available.
pub fn has_aes_ni() -> bool {
    aes::detect()
}
