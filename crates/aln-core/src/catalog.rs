//! Token Catalog (C1, spec.md §4.1). Loaded once, swapped wholesale on
//! reload behind a single lock — never partially rebuilt.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use aln_protocol::{GroupId, MemoryType, Token, TokenCatalogDocument, TokenId};
use tokio::fs;
use tokio::sync::RwLock;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Default)]
struct CatalogData {
    tokens: HashMap<TokenId, Token>,
    groups: HashMap<GroupId, HashSet<TokenId>>,
    score_table: HashMap<(MemoryType, u8), i64>,
    group_bonuses: HashMap<GroupId, i64>,
}

impl CatalogData {
    fn from_document(doc: TokenCatalogDocument) -> Self {
        let mut tokens = HashMap::new();
        let mut groups: HashMap<GroupId, HashSet<TokenId>> = HashMap::new();
        for token in doc.tokens {
            if let Some(group) = &token.group {
                groups.entry(group.clone()).or_default().insert(token.id.clone());
            }
            tokens.insert(token.id.clone(), token);
        }
        let score_table = doc
            .score_table
            .into_iter()
            .map(|e| ((e.memory_type, e.value_rating), e.points))
            .collect();
        let group_bonuses = doc
            .group_bonuses
            .into_iter()
            .map(|b| (b.group, b.bonus_points))
            .collect();
        Self {
            tokens,
            groups,
            score_table,
            group_bonuses,
        }
    }
}

/// Immutable-after-load catalog of token metadata (C1).
pub struct TokenCatalog {
    data: RwLock<Arc<CatalogData>>,
}

impl TokenCatalog {
    pub fn empty() -> Self {
        Self {
            data: RwLock::new(Arc::new(CatalogData::default())),
        }
    }

    pub async fn load_from_path(&self, path: &Path) -> CoreResult<()> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|e| CoreError::Internal(format!("reading token catalog: {e}")))?;
        self.load_from_str(&contents)
    }

    pub fn load_from_str(&self, contents: &str) -> CoreResult<()> {
        let doc: TokenCatalogDocument = serde_json::from_str(contents)
            .map_err(|e| CoreError::Internal(format!("parsing token catalog: {e}")))?;
        self.load_from_document(doc)
    }

    pub fn load_from_document(&self, doc: TokenCatalogDocument) -> CoreResult<()> {
        let data = Arc::new(CatalogData::from_document(doc));
        // try_write: this is only ever called at startup/reload, never while
        // a lookup is pending across an await point, so this never contends.
        let mut guard = self
            .data
            .try_write()
            .map_err(|_| CoreError::Internal("catalog reload already in progress".into()))?;
        *guard = data;
        Ok(())
    }

    pub async fn lookup(&self, token_id: &str) -> Option<Token> {
        self.data.read().await.tokens.get(token_id).cloned()
    }

    pub async fn all(&self) -> Vec<Token> {
        self.data.read().await.tokens.values().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.data.read().await.tokens.len()
    }

    pub async fn group_members(&self, group: &str) -> HashSet<TokenId> {
        self.data
            .read()
            .await
            .groups
            .get(group)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn group_bonus(&self, group: &str) -> i64 {
        self.data
            .read()
            .await
            .group_bonuses
            .get(group)
            .copied()
            .unwrap_or(0)
    }

    /// Pure function of `(memoryType, valueRating)` (spec.md §4.5).
    pub async fn score_for(&self, memory_type: MemoryType, value_rating: u8) -> i64 {
        self.data
            .read()
            .await
            .score_table
            .get(&(memory_type, value_rating))
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aln_protocol::{GroupBonus, MediaAssets, ScoreTableEntry};

    fn sample_doc() -> TokenCatalogDocument {
        TokenCatalogDocument {
            tokens: vec![
                Token {
                    id: "534e2b03".into(),
                    memory_type: MemoryType::Technical,
                    value_rating: 3,
                    group: Some("grp-a".into()),
                    media_assets: MediaAssets::default(),
                    duration: None,
                },
                Token {
                    id: "jaw001".into(),
                    memory_type: MemoryType::Personal,
                    value_rating: 1,
                    group: Some("grp-a".into()),
                    media_assets: MediaAssets {
                        video: Some("jaw001.mp4".into()),
                        ..Default::default()
                    },
                    duration: Some(30),
                },
            ],
            score_table: vec![
                ScoreTableEntry {
                    memory_type: MemoryType::Personal,
                    value_rating: 1,
                    points: 100,
                },
                ScoreTableEntry {
                    memory_type: MemoryType::Technical,
                    value_rating: 3,
                    points: 5000,
                },
            ],
            group_bonuses: vec![GroupBonus {
                group: "grp-a".into(),
                bonus_points: 1000,
            }],
        }
    }

    #[tokio::test]
    async fn lookup_and_score_table() {
        let catalog = TokenCatalog::empty();
        catalog.load_from_document(sample_doc()).unwrap();
        let token = catalog.lookup("534e2b03").await.unwrap();
        assert_eq!(token.value_rating, 3);
        assert_eq!(catalog.score_for(MemoryType::Technical, 3).await, 5000);
        assert_eq!(catalog.lookup("unknown").await.is_none(), true);
    }

    #[tokio::test]
    async fn group_members_and_bonus() {
        let catalog = TokenCatalog::empty();
        catalog.load_from_document(sample_doc()).unwrap();
        let members = catalog.group_members("grp-a").await;
        assert_eq!(members.len(), 2);
        assert_eq!(catalog.group_bonus("grp-a").await, 1000);
        assert_eq!(catalog.group_bonus("nonexistent").await, 0);
    }

    #[tokio::test]
    async fn has_video_flag() {
        let catalog = TokenCatalog::empty();
        catalog.load_from_document(sample_doc()).unwrap();
        assert!(catalog.lookup("jaw001").await.unwrap().has_video());
        assert!(!catalog.lookup("534e2b03").await.unwrap().has_video());
    }
}
