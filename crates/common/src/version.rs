use serde::Serialize;

/// Compile-time facts about the running build
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub build_profile: &'static str,
    pub build_features: Vec<&'static str>,
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.name, self.version, self.build_profile)
    }
}

pub fn build_info() -> BuildInfo {
    let mut build_features = Vec::new();
    if cfg!(feature = "testkit") {
        build_features.push("testkit");
    }

    BuildInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        build_profile: if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
        build_features,
    }
}
