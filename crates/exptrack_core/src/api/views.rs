//! Serialized response shapes.
//!
//! Domain types carry no serde derives; these views are the only JSON the
//! endpoint layer emits.

use crate::model::experiment::{Experiment, ExperimentId, ExperimentSummary};
use crate::model::team::{TeamId, TeamRef};
use crate::service::experiment_service::ExperimentPage;
use crate::service::team_service::TeamDetail;
use serde::Serialize;

/// `{id, name}` as embedded in an experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamSummaryView {
    pub id: TeamId,
    pub name: String,
}

impl From<&TeamRef> for TeamSummaryView {
    fn from(team: &TeamRef) -> Self {
        Self {
            id: team.id,
            name: team.name.clone(),
        }
    }
}

/// `{id, description, sample_ratio}` as embedded in a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExperimentSummaryView {
    pub id: ExperimentId,
    pub description: String,
    pub sample_ratio: i64,
}

impl From<&ExperimentSummary> for ExperimentSummaryView {
    fn from(experiment: &ExperimentSummary) -> Self {
        Self {
            id: experiment.id,
            description: experiment.description.clone(),
            sample_ratio: experiment.sample_ratio,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExperimentView {
    pub id: ExperimentId,
    pub description: String,
    pub sample_ratio: i64,
    pub teams: Vec<TeamSummaryView>,
}

impl From<&Experiment> for ExperimentView {
    fn from(experiment: &Experiment) -> Self {
        Self {
            id: experiment.id,
            description: experiment.description.clone(),
            sample_ratio: experiment.sample_ratio,
            teams: experiment.teams.iter().map(TeamSummaryView::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamView {
    pub id: TeamId,
    pub name: String,
    pub experiments: Vec<ExperimentSummaryView>,
}

impl From<&TeamDetail> for TeamView {
    fn from(detail: &TeamDetail) -> Self {
        Self {
            id: detail.team.id,
            name: detail.team.name.clone(),
            experiments: detail
                .experiments
                .iter()
                .map(ExperimentSummaryView::from)
                .collect(),
        }
    }
}

/// Normalized listing parameters echoed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListMeta {
    /// 1-based.
    pub page: u64,
    pub limit: u32,
    pub order_by: &'static str,
    pub sort_by: &'static str,
    /// Items in this page.
    pub items: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExperimentListView {
    pub data: Vec<ExperimentView>,
    pub meta: ListMeta,
}

impl From<&ExperimentPage> for ExperimentListView {
    fn from(page: &ExperimentPage) -> Self {
        Self {
            data: page.items.iter().map(ExperimentView::from).collect(),
            meta: ListMeta {
                page: page.params.page_number(),
                limit: page.params.limit,
                order_by: page.params.sort_order.as_str(),
                sort_by: page.params.sort_key.as_str(),
                items: page.total_item_count,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ExperimentListView, TeamView};
    use crate::model::experiment::{Experiment, ExperimentSummary, SortKey, SortOrder};
    use crate::model::team::{Team, TeamRef};
    use crate::service::experiment_service::{ExperimentPage, PageParams};
    use crate::service::team_service::TeamDetail;
    use serde_json::json;

    #[test]
    fn list_view_echoes_one_based_page() {
        let page = ExperimentPage {
            items: vec![Experiment {
                id: 4,
                description: "pricing".to_string(),
                sample_ratio: 10,
                teams: vec![TeamRef {
                    id: 2,
                    name: "growth".to_string(),
                }],
            }],
            total_item_count: 1,
            params: PageParams {
                page_index: 1,
                limit: 3,
                sort_key: SortKey::SampleRatio,
                sort_order: SortOrder::Desc,
            },
        };

        let body = serde_json::to_value(ExperimentListView::from(&page)).unwrap();
        assert_eq!(
            body,
            json!({
                "data": [{
                    "id": 4,
                    "description": "pricing",
                    "sample_ratio": 10,
                    "teams": [{"id": 2, "name": "growth"}],
                }],
                "meta": {
                    "page": 2,
                    "limit": 3,
                    "order_by": "desc",
                    "sort_by": "sample_ratio",
                    "items": 1,
                },
            })
        );
    }

    #[test]
    fn team_view_lists_experiment_summaries() {
        let detail = TeamDetail {
            team: Team {
                id: 1,
                name: "core".to_string(),
                parent_id: None,
            },
            experiments: vec![ExperimentSummary {
                id: 8,
                description: "ranking".to_string(),
                sample_ratio: 50,
            }],
        };

        assert_eq!(
            serde_json::to_value(TeamView::from(&detail)).unwrap(),
            json!({
                "id": 1,
                "name": "core",
                "experiments": [{"id": 8, "description": "ranking", "sample_ratio": 50}],
            })
        );
    }
}
