mod article;
mod evaluation;
mod reference;

pub use article::{Article, NewArticle};
pub use evaluation::{
    Evaluation, NewEvaluation, ENTERTAINMENT_MAX, ORIGINALITY_MAX, QUALITY_MAX,
};
pub use reference::ArticleReference;
