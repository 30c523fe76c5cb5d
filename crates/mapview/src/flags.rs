use std::time::Duration;

/// Pending work of both updaters, each with the reason it was requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtyFlags {
    /// Re-render when the minimum route interval has passed.
    pub update_route: bool,
    /// Re-render now and recenter on the route.
    pub replace_route: bool,
    pub repaint_route_immediately: bool,
    /// Repaint when the minimum selection interval has passed.
    pub repaint_selection: bool,
    pub repaint_selection_immediately: bool,
    pub recenter_map: bool,
    pub route_reason: String,
    pub selection_reason: String,
}

/// What made the route updater run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTrigger {
    pub recenter: bool,
    pub reason: String,
}

/// What made the selection updater run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionTrigger {
    pub recenter: bool,
    pub reason: String,
}

impl DirtyFlags {
    pub fn route_due(&self, since_last: Option<Duration>, min_interval: Duration) -> bool {
        self.repaint_route_immediately
            || self.replace_route
            || (self.update_route && since_last.is_none_or(|elapsed| elapsed > min_interval))
    }

    pub fn selection_due(&self, since_last: Option<Duration>, min_interval: Duration) -> bool {
        self.recenter_map
            || self.repaint_selection_immediately
            || (self.repaint_selection && since_last.is_none_or(|elapsed| elapsed > min_interval))
    }

    /// Clears the route flags; the caller renders.
    pub fn take_route(&mut self) -> RouteTrigger {
        let trigger = RouteTrigger {
            recenter: self.replace_route,
            reason: std::mem::take(&mut self.route_reason),
        };
        self.update_route = false;
        self.replace_route = false;
        self.repaint_route_immediately = false;
        trigger
    }

    /// Clears the selection flags; the caller renders.
    pub fn take_selection(&mut self) -> SelectionTrigger {
        let trigger = SelectionTrigger {
            recenter: self.recenter_map,
            reason: std::mem::take(&mut self.selection_reason),
        };
        self.recenter_map = false;
        self.repaint_selection = false;
        self.repaint_selection_immediately = false;
        trigger
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::DirtyFlags;

    const FIVE_SECONDS: Duration = Duration::from_secs(5);

    #[test]
    fn plain_update_waits_for_interval() {
        let flags = DirtyFlags {
            update_route: true,
            ..DirtyFlags::default()
        };
        assert!(flags.route_due(None, FIVE_SECONDS));
        assert!(!flags.route_due(Some(Duration::from_secs(1)), FIVE_SECONDS));
        assert!(flags.route_due(Some(Duration::from_secs(6)), FIVE_SECONDS));
    }

    #[test]
    fn immediate_flags_ignore_interval() {
        let flags = DirtyFlags {
            repaint_route_immediately: true,
            recenter_map: true,
            ..DirtyFlags::default()
        };
        assert!(flags.route_due(Some(Duration::ZERO), FIVE_SECONDS));
        assert!(flags.selection_due(Some(Duration::ZERO), FIVE_SECONDS));
    }

    #[test]
    fn take_clears_and_reports_recenter() {
        let mut flags = DirtyFlags {
            replace_route: true,
            update_route: true,
            route_reason: "replace route".to_string(),
            ..DirtyFlags::default()
        };
        let trigger = flags.take_route();
        assert!(trigger.recenter);
        assert_eq!(trigger.reason, "replace route");
        assert_eq!(flags, DirtyFlags::default());
    }
}
