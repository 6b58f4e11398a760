/// 检索语句的改写策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinementStrategy {
    /// 首轮：主题加学术限定词
    Initial,
    /// 去掉限定词与虚词，放宽检索范围
    Broaden,
    /// 同义改写，优先采用模型给出的建议
    Rephrase,
    /// 换用下一个检索工具
    AlternateTool,
}

impl std::fmt::Display for RefinementStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefinementStrategy::Initial => write!(f, "initial"),
            RefinementStrategy::Broaden => write!(f, "broaden"),
            RefinementStrategy::Rephrase => write!(f, "rephrase"),
            RefinementStrategy::AlternateTool => write!(f, "alternate_tool"),
        }
    }
}

/// 一轮检索计划
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub attempt: u32,
    pub strategy: RefinementStrategy,
    pub queries: Vec<String>,
    /// 使用的检索工具下标
    pub tool_index: usize,
}

const STOPWORDS: [&str; 24] = [
    "a", "an", "the", "of", "in", "on", "for", "and", "or", "to", "with", "among", "between",
    "by", "from", "at", "its", "their", "into", "about", "how", "what", "why", "does",
];

/// 第二轮起的轮换顺序，第三轮换用备用工具
const ROTATION: [RefinementStrategy; 3] = [
    RefinementStrategy::Broaden,
    RefinementStrategy::AlternateTool,
    RefinementStrategy::Rephrase,
];

/// 按轮次生成检索语句
pub struct QueryPlanner {
    topic: String,
    core: String,
    tool_count: usize,
    current_tool: usize,
}

impl QueryPlanner {
    pub fn new(topic: &str, tool_count: usize) -> Self {
        Self {
            topic: topic.trim().to_string(),
            core: core_terms(topic),
            tool_count: tool_count.max(1),
            current_tool: 0,
        }
    }

    pub fn strategy_for(attempt: u32) -> RefinementStrategy {
        if attempt <= 1 {
            RefinementStrategy::Initial
        } else {
            ROTATION[((attempt - 2) as usize) % ROTATION.len()]
        }
    }

    /// 第attempt轮是否需要模型给出的改写建议
    pub fn needs_suggestions(attempt: u32) -> bool {
        Self::strategy_for(attempt) == RefinementStrategy::Rephrase
    }

    /// 生成第attempt轮的检索计划，suggestions为模型给出的改写建议
    pub fn plan(&mut self, attempt: u32, suggestions: &[String]) -> QueryPlan {
        let strategy = Self::strategy_for(attempt);
        let topic = &self.topic;
        let core = &self.core;

        let queries = match strategy {
            RefinementStrategy::Initial => vec![
                format!("{} academic research", topic),
                format!("{} scholarly articles", topic),
            ],
            RefinementStrategy::Broaden => vec![
                core.clone(),
                format!("{} review", core),
                format!("{} overview", core),
            ],
            RefinementStrategy::Rephrase => {
                let suggested: Vec<String> = suggestions
                    .iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .take(3)
                    .collect();
                if suggested.is_empty() {
                    vec![
                        format!("{} literature", topic),
                        format!("{} study findings", core),
                        format!("{} report pdf", core),
                    ]
                } else {
                    suggested
                }
            }
            RefinementStrategy::AlternateTool if self.tool_count > 1 => {
                self.current_tool = (self.current_tool + 1) % self.tool_count;
                vec![
                    format!("{} academic research", topic),
                    format!("{} review", core),
                ]
            }
            RefinementStrategy::AlternateTool => vec![
                format!("{} research paper", core),
                format!("{} case study", core),
            ],
        };

        QueryPlan {
            attempt,
            strategy,
            queries,
            tool_index: self.current_tool,
        }
    }
}

/// 主题去掉虚词后的核心词
pub fn core_terms(topic: &str) -> String {
    let terms: Vec<String> = topic
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '-')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(&w.as_str()))
        .collect();
    if terms.is_empty() {
        topic.trim().to_lowercase()
    } else {
        terms.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_terms_drops_stopwords() {
        assert_eq!(
            core_terms("The Impact of Remote Work on Productivity"),
            "impact remote work productivity"
        );
        assert_eq!(core_terms("the of"), "the of");
    }

    #[test]
    fn test_strategy_rotation() {
        assert_eq!(QueryPlanner::strategy_for(1), RefinementStrategy::Initial);
        assert_eq!(QueryPlanner::strategy_for(2), RefinementStrategy::Broaden);
        assert_eq!(QueryPlanner::strategy_for(3), RefinementStrategy::AlternateTool);
        assert_eq!(QueryPlanner::strategy_for(4), RefinementStrategy::Rephrase);
        assert_eq!(QueryPlanner::strategy_for(5), RefinementStrategy::Broaden);
        assert!(!QueryPlanner::needs_suggestions(3));
        assert!(QueryPlanner::needs_suggestions(4));
    }

    #[test]
    fn test_plans_differ_between_attempts() {
        let mut planner = QueryPlanner::new("Remote work and productivity", 2);
        let first = planner.plan(1, &[]);
        let second = planner.plan(2, &[]);
        assert_eq!(first.queries[0], "Remote work and productivity academic research");
        assert!(second.queries.contains(&"remote work productivity review".to_string()));
        assert!(first.queries.iter().all(|q| !q.contains("review")));
        assert_ne!(first.queries, second.queries);
    }

    #[test]
    fn test_rephrase_prefers_suggestions() {
        let mut planner = QueryPlanner::new("telework", 1);
        let plan = planner.plan(4, &["home office output".to_string(), " ".to_string()]);
        assert_eq!(plan.strategy, RefinementStrategy::Rephrase);
        assert_eq!(plan.queries, vec!["home office output".to_string()]);
    }

    #[test]
    fn test_alternate_tool_switches_when_available() {
        let mut planner = QueryPlanner::new("telework", 2);
        assert_eq!(planner.plan(1, &[]).tool_index, 0);
        assert_eq!(planner.plan(2, &[]).tool_index, 0);
        assert_eq!(planner.plan(3, &[]).tool_index, 1);
        // Later plans stay on the newly selected tool
        assert_eq!(planner.plan(4, &[]).tool_index, 1);

        let mut single = QueryPlanner::new("telework", 1);
        let plan = single.plan(3, &[]);
        assert_eq!(plan.tool_index, 0);
        assert_eq!(plan.queries[0], "telework research paper");
    }
}
