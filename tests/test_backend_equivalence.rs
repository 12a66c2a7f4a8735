// Cross-backend equivalence: for every (paths, pattern, options) triple the
// scalar CPU, SIMD CPU and GPU kernels must produce byte-identical match
// vectors. GPU cases skip quietly on machines without a usable device.

use gpufind::gpu::layout::PackedBatch;
use gpufind::gpu::vulkan::VulkanDriver;
use gpufind::pattern::{glob, MatchOptions};
use gpufind::regex::CompiledRegex;

use proptest::prelude::*;

fn sample_paths() -> Vec<&'static [u8]> {
    vec![
        b"hello.txt",
        b"world.txt",
        b"hello.txt",
        b"file.doc",
        b"/path/to/file.txt",
        b"/other/path/file.txt",
        b"/path/file.doc",
        b".hidden",
        b"visible",
        b".bashrc",
        b"a.txt",
        b"ab.txt",
        b"abc.txt",
        b"1.txt",
        b"5.txt",
        b"9.txt",
        b"/p/src/a.c",
        b"/p/src/a.h",
        b"/src/q/b.c",
        b"/q/b.c",
        b"Hello.TXT",
        b"HELLO.txt",
        b"",
        b"dir/",
        b"deep/nested/directory/holding/a/quite/long/path/main.rs",
    ]
}

fn glob_cases() -> Vec<(&'static [u8], MatchOptions)> {
    let o = MatchOptions::new;
    vec![
        (b"hello.txt" as &[u8], o()),
        (b"*.txt", o()),
        (b"?.txt", o()),
        (b"[0-5].txt", o()),
        (b"hello.txt", o().case_insensitive(true)),
        (b"*/to/*", o().match_path(true)),
        (b"*", o().period(true)),
        (b".*", o().period(true)),
        (b"[!a]*", o()),
        (b"[", o()),
        (b"*[ch]", o().match_path(true)),
    ]
}

#[test]
fn test_vulkan_glob_matches_scalar() {
    let Ok(driver) = VulkanDriver::init() else {
        eprintln!("no vulkan device, skipping");
        return;
    };

    let paths = sample_paths();
    let batch = PackedBatch::pack(&paths).unwrap();

    for (pattern, options) in glob_cases() {
        let gpu = driver.match_names(&batch, pattern, options).unwrap();
        let cpu: Vec<bool> = paths
            .iter()
            .map(|p| glob::matches(pattern, p, options))
            .collect();
        assert_eq!(gpu.verdicts, cpu, "pattern {:?}", pattern);
        assert_eq!(gpu.gpu_count as usize, cpu.iter().filter(|&&m| m).count());
    }
}

#[test]
fn test_vulkan_regex_matches_cpu() {
    let Ok(driver) = VulkanDriver::init() else {
        eprintln!("no vulkan device, skipping");
        return;
    };

    let paths = sample_paths();
    let batch = PackedBatch::pack(&paths).unwrap();

    let patterns: &[(&[u8], bool)] = &[
        (b".*/src/.*\\.c", false),
        (b".*\\.txt", false),
        (b"hello\\..*", true),
        (b".*[0-9].*", false),
        (b"(a|b).*", false),
        (b".*\\bsrc\\b.*", false),
    ];

    for &(pattern, ci) in patterns {
        let re = CompiledRegex::compile(pattern, ci).unwrap();
        let gpu = driver.regex_match_names(&batch, &re).unwrap();
        let cpu: Vec<bool> = paths.iter().map(|p| re.matches_full(p)).collect();
        assert_eq!(gpu.verdicts, cpu, "pattern {:?}", pattern);
    }
}

#[cfg(target_os = "macos")]
#[test]
fn test_metal_matches_scalar() {
    use gpufind::gpu::metal::MetalDriver;

    let Ok(driver) = MetalDriver::init() else {
        eprintln!("no metal device, skipping");
        return;
    };

    let paths = sample_paths();
    let batch = PackedBatch::pack(&paths).unwrap();

    for (pattern, options) in glob_cases() {
        let gpu = driver.match_names(&batch, pattern, options).unwrap();
        let cpu: Vec<bool> = paths
            .iter()
            .map(|p| glob::matches(pattern, p, options))
            .collect();
        assert_eq!(gpu.verdicts, cpu, "pattern {:?}", pattern);
    }

    let re = CompiledRegex::compile(b".*/src/.*\\.c", false).unwrap();
    let gpu = driver.regex_match_names(&batch, &re).unwrap();
    let cpu: Vec<bool> = paths.iter().map(|p| re.matches_full(p)).collect();
    assert_eq!(gpu.verdicts, cpu);
}

proptest! {
    // The SIMD-assisted path must agree with the scalar reference on
    // arbitrary inputs and option sets.
    #[test]
    fn prop_simd_agrees_with_scalar(
        path in "[a-zA-Z0-9./_-]{0,80}",
        pattern in "[a-zA-Z0-9.*?\\[\\]!/-]{0,20}",
        ci in any::<bool>(),
        full in any::<bool>(),
        period in any::<bool>(),
    ) {
        let options = MatchOptions::new()
            .case_insensitive(ci)
            .match_path(full)
            .period(period);
        let scalar = glob::matches(pattern.as_bytes(), path.as_bytes(), options);
        let simd = glob::matches_simd(pattern.as_bytes(), path.as_bytes(), options);
        prop_assert_eq!(scalar, simd);
    }

    // Whole-input acceptance implies scan acceptance.
    #[test]
    fn prop_full_match_implies_is_match(
        text in "[a-z./]{0,30}",
        pattern in "[a-z.*+?|()\\[\\]]{0,10}",
    ) {
        if let Ok(re) = CompiledRegex::compile(pattern.as_bytes(), false) {
            if re.matches_full(text.as_bytes()) {
                prop_assert!(re.is_match(text.as_bytes()));
            }
        }
    }
}
