//! Terminal detection

use std::io::IsTerminal;

/// Decides whether output is styled
#[derive(Debug, Clone, Copy)]
pub struct UiContext {
    styled: bool,
}

const CI_VARS: [&str; 6] = [
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "BUILDKITE",
    "JENKINS_URL",
    "TF_BUILD",
];

impl UiContext {
    /// Styled output on a terminal outside CI
    pub fn detect() -> Self {
        let styled = std::io::stdout().is_terminal()
            && std::env::var_os("NO_COLOR").is_none()
            && !CI_VARS.iter().any(|var| std::env::var_os(var).is_some());
        Self { styled }
    }

    /// Unstyled output regardless of the environment
    pub fn plain() -> Self {
        Self { styled: false }
    }

    pub fn is_styled(&self) -> bool {
        self.styled
    }
}
