use serde::{Deserialize, Serialize};

use super::{ClientIdentity, Document, DocumentKind, DocumentMeta};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSection {
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// Commentary on one of the report photos; `image_index` points into
/// [`TechnicalReportData::images`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoAnalysis {
    pub image_index: usize,
    #[serde(default)]
    pub legend: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportConclusion {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub findings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalReportData {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub client: ClientIdentity,
    #[serde(default)]
    pub technician: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub development: Vec<ReportSection>,
    #[serde(default)]
    pub photo_analyses: Vec<PhotoAnalysis>,
    #[serde(default)]
    pub conclusion: ReportConclusion,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

impl TechnicalReportData {
    pub fn photo_for(&self, analysis: &PhotoAnalysis) -> Option<&str> {
        self.images.get(analysis.image_index).map(String::as_str)
    }

    /// Drops analyses whose index does not match an attached photo and
    /// returns how many were removed.
    pub fn retain_known_photos(&mut self) -> usize {
        let images = self.images.len();
        let before = self.photo_analyses.len();
        self.photo_analyses
            .retain(|analysis| analysis.image_index < images);
        before - self.photo_analyses.len()
    }
}

impl Document for TechnicalReportData {
    const KIND: DocumentKind = DocumentKind::TechnicalReport;

    fn meta(&self) -> &DocumentMeta {
        &self.meta
    }

    fn client(&self) -> &ClientIdentity {
        &self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(index: usize) -> PhotoAnalysis {
        PhotoAnalysis {
            image_index: index,
            legend: format!("Foto {}", index + 1),
            description: String::new(),
        }
    }

    #[test]
    fn retain_known_photos_drops_dangling_indices() {
        let mut report = TechnicalReportData {
            meta: DocumentMeta::new(DocumentKind::TechnicalReport),
            client: ClientIdentity::default(),
            technician: "Rui".to_string(),
            title: String::new(),
            development: Vec::new(),
            photo_analyses: vec![analysis(0), analysis(3), analysis(1)],
            conclusion: ReportConclusion::default(),
            recommendations: Vec::new(),
            images: vec!["a.jpg".to_string(), "b.jpg".to_string()],
        };
        assert_eq!(report.retain_known_photos(), 1);
        assert_eq!(
            report
                .photo_analyses
                .iter()
                .map(|row| row.image_index)
                .collect::<Vec<_>>(),
            vec![0, 1]
        );
        assert_eq!(report.photo_for(&report.photo_analyses[1]), Some("b.jpg"));
    }
}
