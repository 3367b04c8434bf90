//! Repository for the `corpus_words` and `corpus_lemmas` tables.

use glossa_core::corpus::NewCorpusWord;
use sqlx::PgPool;

use crate::models::corpus::CorpusWordRow;

/// Column list for `corpus_words` queries.
const COLUMNS: &str = "id, lemma_index, surface, lemma, is_noun, created_at";

/// Provides lookup and conflict-tolerant insertion of corpus words.
pub struct CorpusWordRepo;

impl CorpusWordRepo {
    /// Words whose surface or lemma is in the given lists.
    pub async fn find_by_surfaces_or_lemmas(
        pool: &PgPool,
        surfaces: &[String],
        lemmas: &[String],
    ) -> Result<Vec<CorpusWordRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM corpus_words \
             WHERE surface = ANY($1) OR lemma = ANY($2) \
             ORDER BY id"
        );
        sqlx::query_as::<_, CorpusWordRow>(&query)
            .bind(surfaces)
            .bind(lemmas)
            .fetch_all(pool)
            .await
    }

    /// Insert words in order, returning each stored row and whether this
    /// call created it.
    ///
    /// The lemma is registered in `corpus_lemmas` first; when another
    /// writer already registered it, the word takes the existing index and
    /// the proposed one is left unused.
    pub async fn insert_many(
        pool: &PgPool,
        words: &[NewCorpusWord],
    ) -> Result<Vec<(CorpusWordRow, bool)>, sqlx::Error> {
        let insert_word = format!(
            "INSERT INTO corpus_words (lemma_index, surface, lemma, is_noun) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT ON CONSTRAINT uq_corpus_words_surface_noun DO NOTHING \
             RETURNING {COLUMNS}"
        );
        let select_word =
            format!("SELECT {COLUMNS} FROM corpus_words WHERE surface = $1 AND is_noun = $2");

        let mut tx = pool.begin().await?;
        let mut out = Vec::with_capacity(words.len());
        for word in words {
            sqlx::query(
                "INSERT INTO corpus_lemmas (lemma, lemma_index) VALUES ($1, $2) \
                 ON CONFLICT ON CONSTRAINT uq_corpus_lemmas_lemma DO NOTHING",
            )
            .bind(&word.lemma)
            .bind(word.lemma_index)
            .execute(&mut *tx)
            .await?;
            let lemma_index = sqlx::query_scalar::<_, i64>(
                "SELECT lemma_index FROM corpus_lemmas WHERE lemma = $1",
            )
            .bind(&word.lemma)
            .fetch_one(&mut *tx)
            .await?;

            let inserted = sqlx::query_as::<_, CorpusWordRow>(&insert_word)
                .bind(lemma_index)
                .bind(&word.surface)
                .bind(&word.lemma)
                .bind(word.is_noun)
                .fetch_optional(&mut *tx)
                .await?;
            let resolved = match inserted {
                Some(row) => (row, true),
                None => {
                    let row = sqlx::query_as::<_, CorpusWordRow>(&select_word)
                        .bind(&word.surface)
                        .bind(word.is_noun)
                        .fetch_one(&mut *tx)
                        .await?;
                    (row, false)
                }
            };
            out.push(resolved);
        }
        tx.commit().await?;
        Ok(out)
    }

    /// Highest lemma index handed out, if any.
    pub async fn max_lemma_index(pool: &PgPool) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(lemma_index) FROM corpus_lemmas")
            .fetch_one(pool)
            .await
    }
}
