/// Engagement rate as a percentage: `(likes + comments) / views * 100`.
///
/// Zero views or any missing counter means no metric is available.
pub fn engagement_rate(views: Option<i64>, likes: Option<i64>, comments: Option<i64>) -> Option<f64> {
    let (views, likes, comments) = (views?, likes?, comments?);
    if views == 0 {
        return None;
    }
    Some((likes as f64 + comments as f64) * 100.0 / views as f64)
}
