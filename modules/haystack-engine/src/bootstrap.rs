//! Production wiring: real store, real LLM chain, real collectors.

use std::sync::Arc;

use ai_client::{LlmClient, LlmGenerate};
use haystack_common::Config;
use haystack_store::{RestStore, Store};

use crate::adaptive::AdaptiveThresholds;
use crate::collectors::{
    api::ApiCollector, feed::FeedCollector, scrape::ScrapeCollector, social::SocialCollector,
    tip::TipCollector, CollectorRegistry,
};
use crate::infra::rate_limit::RateLimiter;
use crate::infra::robots::{CrawlPolicy, RobotsPolicy};
use crate::pipeline::state::PipelineDeps;
use crate::pipeline::Pipeline;

pub fn build_pipeline(config: Arc<Config>) -> Arc<Pipeline> {
    let store: Arc<dyn Store> = Arc::new(RestStore::new(
        &config.store_url,
        &config.store_service_key,
    ));

    let llm: Arc<dyn LlmGenerate> = Arc::new(
        LlmClient::new(&config.ollama_base_url, &config.ollama_model)
            .with_anthropic(&config.anthropic_api_key, &config.anthropic_model)
            .with_openai(&config.openai_api_key, &config.openai_model),
    );

    // Process-wide crawling state: one limiter, one robots cache.
    let limiter = Arc::new(RateLimiter::new());
    let robots: Arc<dyn CrawlPolicy> = Arc::new(RobotsPolicy::new());

    let collectors = CollectorRegistry::new()
        .register(Arc::new(FeedCollector::new()))
        .register(Arc::new(ScrapeCollector::new(robots, limiter)))
        .register(Arc::new(ApiCollector::new(config.clone())))
        .register(Arc::new(SocialCollector::new(config.clone())))
        .register(Arc::new(TipCollector::new(store.clone())));

    let thresholds = Arc::new(AdaptiveThresholds::new(config.min_relevance_score));

    Arc::new(Pipeline::new(PipelineDeps {
        store,
        llm,
        thresholds,
        collectors,
        config,
    }))
}
