// Linux identity helpers: /proc/cpuinfo, /etc/os-release, DMI.

/// First "model name" in /proc/cpuinfo. sysinfo reports "cpu0" on some kernels.
pub(super) fn cpu_model() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let content = std::fs::read_to_string("/proc/cpuinfo").ok()?;
        return content
            .lines()
            .find(|l| l.starts_with("model name"))
            .and_then(|l| l.split_once(':'))
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty() && *v != "cpu0")
            .map(str::to_string);
    }
    #[cfg(not(target_os = "linux"))]
    None
}

/// PRETTY_NAME from /etc/os-release, falling back to NAME.
pub(super) fn os_pretty_name() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let content = std::fs::read_to_string("/etc/os-release").ok()?;
        return parse_os_release(&content);
    }
    #[cfg(not(target_os = "linux"))]
    None
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_os_release(content: &str) -> Option<String> {
    let value = |key: &str| {
        content
            .lines()
            .find_map(|l| l.strip_prefix(key))
            .map(|v| v.trim().trim_matches('"'))
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    value("PRETTY_NAME=").or_else(|| value("NAME="))
}

pub(super) fn system_vendor() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let v = std::fs::read_to_string("/sys/class/dmi/id/sys_vendor").ok()?;
        let v = v.trim();
        return (!v.is_empty()).then(|| v.to_string());
    }
    #[cfg(not(target_os = "linux"))]
    None
}
