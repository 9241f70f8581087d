//! Team records and the parent link that forms the team forest.

/// Storage-assigned team identifier.
pub type TeamId = i64;

/// One node of the team forest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub id: TeamId,
    /// Unique across all teams.
    pub name: String,
    /// `None` for a root team. Set at creation only.
    pub parent_id: Option<TeamId>,
}

/// Parent edge of one team, the only data the hierarchy walk needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TeamLink {
    pub id: TeamId,
    pub parent_id: Option<TeamId>,
}

/// Team summary embedded in experiment read models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamRef {
    pub id: TeamId,
    pub name: String,
}

/// Validated input for team creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTeam {
    pub name: String,
    pub parent_id: Option<TeamId>,
}

impl NewTeam {
    /// Trims `name`; returns `None` when nothing is left.
    pub fn new(name: &str, parent_id: Option<TeamId>) -> Option<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            name: trimmed.to_string(),
            parent_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::NewTeam;

    #[test]
    fn new_team_trims_and_rejects_blank_names() {
        let team = NewTeam::new("  platform ", Some(3)).expect("name is not blank");
        assert_eq!(team.name, "platform");
        assert_eq!(team.parent_id, Some(3));

        assert!(NewTeam::new(" \t ", None).is_none());
    }
}
