use serde::{Deserialize, Serialize};

/// Device classification derived from the user-agent string at track time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// `desktop`, `mobile`, or `tablet`.
    pub device_type: String,
    pub os: String,
    pub browser: String,
}

impl DeviceInfo {
    /// Substring heuristics over a lowercased UA string.
    ///
    /// Precedence is fixed and part of the ingestion contract:
    /// - device: tablet/ipad before android/mobile/iphone, else desktop
    /// - OS: Windows, macOS, Linux, Android, iOS
    /// - browser: Edge, Chrome (not Edge), Firefox, Safari (not Chrome), Opera
    pub fn classify(user_agent: &str) -> Self {
        let ua = user_agent.to_lowercase();

        let device_type = if ua.contains("tablet") || ua.contains("ipad") {
            "tablet"
        } else if ua.contains("android") || ua.contains("mobile") || ua.contains("iphone") {
            "mobile"
        } else {
            "desktop"
        };

        let os = if ua.contains("windows") {
            "Windows"
        } else if ua.contains("mac os") || ua.contains("macos") || ua.contains("macintosh") {
            "macOS"
        } else if ua.contains("linux") && !ua.contains("android") {
            "Linux"
        } else if ua.contains("android") {
            "Android"
        } else if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ios") {
            "iOS"
        } else {
            "unknown"
        };

        let browser = if ua.contains("edg") {
            "Edge"
        } else if ua.contains("chrome") {
            "Chrome"
        } else if ua.contains("firefox") {
            "Firefox"
        } else if ua.contains("safari") {
            "Safari"
        } else if ua.contains("opera") || ua.contains("opr") {
            "Opera"
        } else {
            "unknown"
        };

        Self {
            device_type: device_type.to_string(),
            os: os.to_string(),
            browser: browser.to_string(),
        }
    }
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            device_type: "desktop".to_string(),
            os: "unknown".to_string(),
            browser: "unknown".to_string(),
        }
    }
}
