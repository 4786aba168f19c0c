//! CI environment detection, used for the progress-bar default.

/// Environment variables that well-known CI systems set.
const CI_ENV_VARS: &[&str] = &[
    "CI",
    "TF_BUILD",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "BUILDKITE",
    "CIRCLECI",
    "TRAVIS",
    "JENKINS_URL",
    "TEAMCITY_VERSION",
];

/// Whether the process appears to run under a CI system.
pub fn is_ci() -> bool {
    CI_ENV_VARS.iter().any(|name| {
        std::env::var(name)
            .map(|value| !value.is_empty() && value != "0" && value.to_lowercase() != "false")
            .unwrap_or(false)
    })
}
