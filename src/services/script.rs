use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::core::error::PipelineError;
use crate::core::pod::PodConfig;
use crate::services::llm::LlmClient;

pub const NARRATOR: &str = "Narrator";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Script {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub scenes: Vec<Scene>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scene {
    pub visual_prompt: String,
    #[serde(default)]
    pub audio_text: String,
    #[serde(default = "default_character")]
    pub character: String,
    /// Falls back to the configured scene length when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_est: Option<f64>,
}

fn default_title() -> String {
    "Untitled".to_string()
}

fn default_character() -> String {
    NARRATOR.to_string()
}

impl Script {
    /// Output file stem: the title with spaces turned into underscores.
    pub fn file_stem(&self) -> String {
        self.title.replace(' ', "_")
    }
}

pub fn strip_code_blocks(s: &str) -> String {
    let s = s.trim();
    if s.starts_with("```json") {
        s.trim_start_matches("```json").trim_end_matches("```").trim().to_string()
    } else if s.starts_with("```") {
        s.trim_start_matches("```").trim_end_matches("```").trim().to_string()
    } else {
        s.to_string()
    }
}

pub fn build_prompt(pod: &PodConfig, context: &str, topic: &str) -> Result<String> {
    let characters_json = serde_json::to_string(&pod.characters)?;
    let prompt = format!(
        "ACTÚA COMO: {persona}\n\
        \n\
        CONTEXTO (Memoria de la serie):\n\
        {context}\n\
        \n\
        TAREA:\n\
        Escribe el guion de un video corto vertical de {duration} segundos.\n\
        Tema del episodio: \"{topic}\"\n\
        \n\
        PERSONAJES:\n\
        {characters}\n\
        \n\
        FORMATO DE SALIDA (solo JSON, sin texto adicional):\n\
        {{\n\
        \x20   \"title\": \"Título del episodio\",\n\
        \x20   \"summary\": \"Resumen de una frase de lo que ocurre (se guarda en la memoria)\",\n\
        \x20   \"scenes\": [\n\
        \x20       {{\n\
        \x20           \"visual_prompt\": \"Descripción detallada de la imagen, en estilo {style}\",\n\
        \x20           \"audio_text\": \"Lo que dice el narrador o el personaje\",\n\
        \x20           \"character\": \"Nombre del personaje que habla o '{narrator}'\",\n\
        \x20           \"duration_est\": 5\n\
        \x20       }}\n\
        \x20   ]\n\
        }}\n",
        persona = pod.system_prompt,
        context = context.trim_end(),
        duration = pod.video_duration_seconds,
        topic = topic,
        characters = characters_json,
        style = pod.consistency.art_style_lora,
        narrator = NARRATOR,
    );
    Ok(prompt)
}

/// Structural decode only; no semantic validation of the scenes.
pub fn parse_script(response: &str) -> Result<Script> {
    let clean_json = strip_code_blocks(response);
    let script: Script = serde_json::from_str(&clean_json)
        .map_err(|e| PipelineError::Decode(format!("{}. Body: {}", e, clean_json)))?;
    Ok(script)
}

pub struct ScriptStage<'a> {
    pod: &'a PodConfig,
    llm: &'a dyn LlmClient,
}

impl<'a> ScriptStage<'a> {
    pub fn new(pod: &'a PodConfig, llm: &'a dyn LlmClient) -> Self {
        Self { pod, llm }
    }

    /// One generation request, one decode attempt. A malformed body surfaces
    /// as `PipelineError::Decode`; transport failures stay fatal.
    pub async fn generate(&self, topic: &str, context: &str) -> Result<Script> {
        let prompt = build_prompt(self.pod, context, topic)?;
        let response = self
            .llm
            .chat("", &prompt)
            .await
            .context("Script generation request failed")?;

        match parse_script(&response) {
            Ok(script) => {
                info!("Script '{}' with {} scenes", script.title, script.scenes.len());
                Ok(script)
            }
            Err(e) => {
                warn!("Error decoding JSON from script response: {:#}", e);
                Err(e)
            }
        }
    }
}
