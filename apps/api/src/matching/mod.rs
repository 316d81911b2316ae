// LLM Matching Pipeline: screens resume text against a job description.
// All inference calls go through llm_client; nothing here speaks HTTP to the model.

pub mod cache;
pub mod handlers;
pub mod invoker;
pub mod pipeline;
pub mod prompts;
pub mod recovery;
pub mod resolver;
