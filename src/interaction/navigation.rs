//! Explicit page routing for hosts.
//!
//! A `NavigationContext` is owned by the host and handed to whatever needs to
//! move between pages; there is no process-wide "current page".

use std::{fmt, str::FromStr};

use serde::Serialize;
use tracing::debug;

/// Pages of the CareLink front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Page {
    Landing,
    PatientDashboard,
    DoctorDashboard,
    Triage,
    Profile,
    Appointments,
    StyleGuide,
}

impl Page {
    pub const ALL: [Page; 7] = [
        Page::Landing,
        Page::PatientDashboard,
        Page::DoctorDashboard,
        Page::Triage,
        Page::Profile,
        Page::Appointments,
        Page::StyleGuide,
    ];

    /// Route identifier, e.g. `patient-dashboard`.
    pub fn slug(&self) -> &'static str {
        match self {
            Page::Landing => "landing",
            Page::PatientDashboard => "patient-dashboard",
            Page::DoctorDashboard => "doctor-dashboard",
            Page::Triage => "triage",
            Page::Profile => "profile",
            Page::Appointments => "appointments",
            Page::StyleGuide => "style-guide",
        }
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Page {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Page::ALL
            .into_iter()
            .find(|page| page.slug() == s.trim())
            .ok_or_else(|| anyhow::anyhow!("Unknown page `{s}`."))
    }
}

/// Current page plus the pages visited before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationContext {
    current: Page,
    history: Vec<Page>,
}

impl Default for NavigationContext {
    fn default() -> Self {
        Self::new(Page::Landing)
    }
}

impl NavigationContext {
    pub fn new(start: Page) -> Self {
        Self { current: start, history: Vec::new() }
    }

    pub fn current(&self) -> Page {
        self.current
    }

    /// Move to `page`. Navigating to the current page is a no-op.
    pub fn navigate(&mut self, page: Page) {
        if page == self.current {
            return;
        }

        debug!("Navigating from `{}` to `{}`.", self.current, page);

        self.history.push(self.current);
        self.current = page;
    }

    /// Return to the previous page, staying put when there is none.
    pub fn back(&mut self) -> Page {
        if let Some(previous) = self.history.pop() {
            debug!("Navigating back from `{}` to `{}`.", self.current, previous);
            self.current = previous;
        }

        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_round_trip() {
        for page in Page::ALL {
            assert_eq!(page.slug().parse::<Page>().unwrap(), page);
        }

        assert!("checkout".parse::<Page>().is_err());
    }

    #[test]
    fn test_navigate_and_back() {
        let mut nav = NavigationContext::new(Page::PatientDashboard);

        nav.navigate(Page::Triage);
        nav.navigate(Page::Triage);
        nav.navigate(Page::Appointments);

        assert_eq!(nav.current(), Page::Appointments);
        assert_eq!(nav.back(), Page::Triage);
        assert_eq!(nav.back(), Page::PatientDashboard);
        assert_eq!(nav.back(), Page::PatientDashboard);
    }
}
