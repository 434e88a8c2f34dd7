//! Sample content for local development (`db seed`, `db reset`).

use draftsmith_markdown::bullet_points;
use draftsmith_shared::{
    ContentStatus, MAX_SUMMARY_POINTS, PipelineState, ResearchBundle, Result, TopicSummary,
};
use draftsmith_storage::Storage;
use tracing::info;

struct Sample {
    topic: &'static str,
    draft: &'static str,
    source: &'static str,
    notes: &'static str,
}

const SAMPLES: [Sample; 9] = [
    Sample {
        topic: "Artificial Intelligence",
        draft: "An introduction to artificial intelligence and where it is heading.",
        source: "AI Trends",
        notes: "AI adoption has grown quickly over the last decade. Most large companies now run AI in production.",
    },
    Sample {
        topic: "Machine Learning",
        draft: "A look at how machine learning is changing software.",
        source: "Machine Learning Journal",
        notes: "Machine learning models keep getting larger. Training costs have fallen per parameter.",
    },
    Sample {
        topic: "Blockchain",
        draft: "Why blockchain keeps showing up outside of cryptocurrency.",
        source: "Blockchain Revolution",
        notes: "Blockchain ledgers are used in finance and logistics. Settlement times drop when intermediaries go away.",
    },
    Sample {
        topic: "Data Science",
        draft: "Data science blends statistics, programming, and domain knowledge.",
        source: "Data Science Insights",
        notes: "Data science combines statistics and computer science. Domain knowledge decides which questions matter.",
    },
    Sample {
        topic: "Cybersecurity",
        draft: "As more systems connect, security matters more than ever.",
        source: "Cybersecurity Today",
        notes: "Reported cyber attacks keep rising. Ransomware is the most costly category.",
    },
    Sample {
        topic: "Cloud Computing",
        draft: "How the cloud changed the way teams build and run software.",
        source: "Cloud Computing Review",
        notes: "Cloud services trade capital cost for operating cost. Elastic capacity lets small teams scale.",
    },
    Sample {
        topic: "Virtual Reality",
        draft: "Virtual reality is moving from games into classrooms and clinics.",
        source: "VR World",
        notes: "VR headsets are used for training and therapy. Gaming still drives most hardware sales.",
    },
    Sample {
        topic: "Quantum Computing",
        draft: "Quantum computing and the problems it may one day solve.",
        source: "Quantum Computing Weekly",
        notes: "Quantum computers use qubits. Some problems may become tractable. Error correction remains the main obstacle.",
    },
    Sample {
        topic: "5G Technology",
        draft: "What 5G means for mobile networks and connected devices.",
        source: "5G Network Solutions",
        notes: "5G offers higher bandwidth and lower latency. Dense deployments need many small cells.",
    },
];

/// Insert the sample items, each drafted and carrying research.
/// Returns the number of items inserted.
pub async fn seed(storage: &Storage) -> Result<usize> {
    for sample in &SAMPLES {
        let item = storage
            .insert_content_item(Some(sample.topic), Some(sample.draft), ContentStatus::Draft)
            .await?;

        let bundle = ResearchBundle {
            source: sample.source.to_string(),
            main_topic: TopicSummary {
                title: sample.topic.to_string(),
                description: sample.source.to_string(),
                summary: bullet_points(sample.notes, MAX_SUMMARY_POINTS),
                url: String::new(),
            },
            related_topics: Vec::new(),
        };
        storage.upsert_research(&item.id, &bundle).await?;
        storage.set_stage(&item.id, PipelineState::Drafted).await?;
    }

    info!(count = SAMPLES.len(), "sample data inserted");
    Ok(SAMPLES.len())
}

/// Remove every record, then seed.
pub async fn reset(storage: &Storage) -> Result<usize> {
    storage.clear_all().await?;
    info!("all records cleared");
    seed(storage).await
}
