/// Decides who counts as a trainer. The current strategy is a
/// case-insensitive match of role names against a configured allow-list;
/// keeping it behind this type means call sites don't change if the
/// matching ever moves to role ids or a proper permission check.
#[derive(Clone, Debug)]
pub struct TrainerPolicy {
    allowed: Vec<String>,
}

impl TrainerPolicy {
    pub fn new(allowed: impl IntoIterator<Item = String>) -> Self {
        Self {
            allowed: allowed.into_iter().map(|r| r.to_lowercase()).collect(),
        }
    }

    /// Whether a single role name is on the allow-list.
    pub fn matches(&self, role_name: &str) -> bool {
        let role_name = role_name.to_lowercase();
        self.allowed.iter().any(|a| *a == role_name)
    }

    /// True iff any of the given role names is on the allow-list. A user
    /// with no roles is never a trainer.
    pub fn is_trainer<'a>(&self, roles: impl IntoIterator<Item = &'a str>) -> bool {
        roles.into_iter().any(|r| self.matches(r))
    }
}
