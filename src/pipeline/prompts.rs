use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};

use crate::config::AppConfig;

pub const DEFAULT_PROMPTS_DIR: &str = "prompts";
pub const DEFAULT_GAME_CONTEXT: &str = "game_context.txt";

/// Placeholder replaced by the newline-joined batch.
pub const TEXTS_VAR: &str = "texts";

#[derive(Clone, Debug)]
pub struct PromptSet {
    pub game_context: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            game_context: DEFAULT_GAME_CONTEXT_TEXT.to_string(),
        }
    }
}

impl PromptSet {
    /// Uses the configured template file when `[prompts] game_context` is
    /// set (relative to the config file), the built-in text otherwise.
    pub fn load(config_path: &Path, cfg: &AppConfig) -> anyhow::Result<Self> {
        let Some(rel) = cfg
            .prompts
            .game_context
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            return Ok(Self::default());
        };
        let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
        let mut p = PathBuf::from(rel);
        if p.is_relative() {
            p = config_dir.join(&p);
        }
        if !p.exists() {
            return Err(anyhow!(
                "prompt file not found for game_context: {} (run: sekai-translate --init-config)",
                p.display()
            ));
        }
        let text =
            std::fs::read_to_string(&p).with_context(|| format!("read prompt: {}", p.display()))?;
        Ok(Self { game_context: text })
    }

    /// One prompt for one batch: the domain preamble followed by one text
    /// per line, in batch order.
    pub fn batch_prompt(&self, texts: &[String]) -> String {
        let joined = texts.join("\n");
        let pat = format!("{{{{{TEXTS_VAR}}}}}");
        if self.game_context.contains(&pat) {
            render_template(&self.game_context, &[(TEXTS_VAR, &joined)])
        } else {
            format!("{}{joined}", self.game_context)
        }
    }
}

pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (k, v) in vars {
        let pat = format!("{{{{{k}}}}}");
        out = out.replace(&pat, v);
    }
    out
}

pub fn default_prompt_files() -> Vec<(&'static str, &'static str)> {
    vec![(DEFAULT_GAME_CONTEXT, DEFAULT_GAME_CONTEXT_TEXT)]
}

pub const DEFAULT_GAME_CONTEXT_TEXT: &str = r#"你是一个专业的游戏翻译器，专门翻译《世界计划 彩色舞台 feat. 初音未来》(Project SEKAI) 游戏内容。

游戏背景设定：
游戏中存在一个现实世界和虚拟世界「世界」，游戏的主人公团体（5个团体，每个团有4个角色）各有一个「世界」，他们能够通过电子设备上神秘出现的「Untitled」歌曲往返现实世界和「世界」。在「世界」中，原本在现实世界的虚拟歌手（比如初音未来）变为了真实的存在，能够与主人公团体互动。「世界」反映的是主人的强烈的心愿，而虚拟歌手们会帮助主人公团体一步步达成他们的心愿。

角色译名表（日文 -> 中文）：
Virtual Singer(虚拟歌手):
- 初音ミク: 初音未来
- 鏡音リン: 镜音铃
- 鏡音レン: 镜音连
- 巡音ルカ: 巡音流歌
- MEIKO: MEIKO
- KAITO: KAITO

Leo/need (教室的世界):
- 星乃一歌: 星乃一歌
- 天馬咲希: 天马咲希
- 望月穂波: 望月穗波
- 日野森志歩: 日野森志步

MORE MORE JUMP! (舞台的世界):
- 花里みのり: 花里实乃里
- 桐谷遥: 桐谷遥
- 桃井愛莉: 桃井爱莉
- 日野森雫: 日野森雫

Vivid BAD SQUAD (街头的世界):
- 小豆沢こはね: 小豆泽心羽
- 白石杏: 白石杏
- 東雲彰人: 东云彰人
- 青柳冬弥: 青柳冬弥

Wonderlands×Showtime (奇幻的世界):
- 天馬司: 天马司
- 鳳えむ: 凤笑梦
- 草薙寧々: 草薙宁宁
- 神代類: 神代类

25時、ナイトコードで。(无人的世界):
- 宵崎奏: 宵崎奏
- 朝比奈まふゆ: 朝比奈真冬
- 東雲絵名: 东云绘名
- 暁山瑞希: 暁山瑞希

请将以下日文文本翻译成简体中文。保持翻译简洁、自然，符合游戏风格。
只返回翻译结果，每行一个，与输入顺序对应。不要添加序号或额外说明。

待翻译文本：
{{texts}}"#;
