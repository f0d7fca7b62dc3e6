use std::path::PathBuf;
use crate::models::KeyframeAnalysis;

/// 关键帧描述提示词
pub const KEYFRAME_PROMPT: &str = "Analyze each keyframe comprehensively using the following steps. \
Your final answer should just be a labeled, 2-3 sentence description for each keyframe, \
starting with 'Keyframe X:' where X is the keyframe number.
Step 1: Provide a brief overview of the entire scene, including the setting and general composition.
Step 2: Identify and list the main subjects, objects, or people present in the image.
Step 3: Describe any actions, interactions, or movements occurring within the scene.
Step 4: Highlight any notable details, unusual elements, or subtle nuances that contribute to the image's uniqueness.
Step 5: Interpret the overall mood, atmosphere, or emotional tone conveyed by the image.
Step 6: If applicable, comment on the artistic style, lighting, color palette, or photographic techniques used.
Step 7: Suggest any potential symbolism, themes, or messages that might be present in the image.
";

/// 歌曲提示词生成的系统提示词
pub const SONG_PROMPT_TEMPLATE: &str = "
Generate a concise summary (max 200 characters) combining keyframe descriptions and transcription.
Then, assign a music genre and style based on the scene's mood and elements.

Format your response as:
A [style] [genre] song about [summary]

Instructions:
1. Analyze all keyframe descriptions and transcription.
2. Identify key themes, mood, and notable elements.
3. Summarize in 200 characters or less.
4. Choose an appropriate music genre and style that match the overall tone.
5. Do not include explanations or additional text.
6. Ensure the final output fits the specified format.
";

/// 描述失败时的占位文本
pub const DESCRIPTION_ERROR: &str = "Error generating description";

/// 提示词生成失败时的占位文本
pub const PROMPT_ERROR: &str = "Error generating Suno prompt";

/// 转写失败时写入结果的文本
pub fn transcription_error(err: impl std::fmt::Display) -> String {
    format!("Error in transcription: {}", err)
}

/// 关键帧名称，编号从 1 开始
pub fn keyframe_label(ordinal: usize) -> String {
    format!("keyframe_{}", ordinal)
}

/// 按 "Keyframe" 切分模型回复，与关键帧路径按顺序配对
///
/// 第一个 "Keyframe" 之前的内容会被丢弃；描述数量少于关键帧数量时，多出的关键帧不返回。
pub fn split_keyframe_descriptions(full_description: &str, keyframe_paths: &[PathBuf]) -> Vec<KeyframeAnalysis> {
    full_description
        .split("Keyframe")
        .skip(1)
        .zip(keyframe_paths)
        .enumerate()
        .map(|(i, (desc, path))| KeyframeAnalysis {
            frame: keyframe_label(i + 1),
            path: path.to_string_lossy().to_string(),
            description: desc.trim().to_string(),
        })
        .collect()
}

/// 描述失败时为每个关键帧生成占位结果
pub fn fallback_descriptions(keyframe_paths: &[PathBuf]) -> Vec<KeyframeAnalysis> {
    keyframe_paths
        .iter()
        .enumerate()
        .map(|(i, path)| KeyframeAnalysis {
            frame: keyframe_label(i + 1),
            path: path.to_string_lossy().to_string(),
            description: DESCRIPTION_ERROR.to_string(),
        })
        .collect()
}

/// 合并所有关键帧描述，每行一个
pub fn combine_keyframe_descriptions(analysis: &[KeyframeAnalysis]) -> String {
    analysis
        .iter()
        .map(|kf| kf.description.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// 拼接关键帧描述和转写文本（如果有）
pub fn create_full_content(keyframe_descriptions: &str, transcription: Option<&str>) -> String {
    match transcription {
        Some(text) if !text.is_empty() => {
            format!("{}\n\nTranscription: {}", keyframe_descriptions, text)
        }
        _ => keyframe_descriptions.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(n: usize) -> Vec<PathBuf> {
        (1..=n).map(|i| PathBuf::from(format!("media/v/keyframe_{}.jpg", i))).collect()
    }

    #[test]
    fn test_split_descriptions() {
        let reply = "Here you go.\nKeyframe 1: A beach at dusk.\nKeyframe 2: A dog running.\n";
        let analysis = split_keyframe_descriptions(reply, &paths(2));

        assert_eq!(analysis.len(), 2);
        assert_eq!(analysis[0].frame, "keyframe_1");
        assert_eq!(analysis[0].description, "1: A beach at dusk.");
        assert_eq!(analysis[1].path, "media/v/keyframe_2.jpg");
    }

    #[test]
    fn test_split_with_fewer_descriptions() {
        let analysis = split_keyframe_descriptions("Keyframe 1: only one", &paths(3));
        assert_eq!(analysis.len(), 1);
        assert!(split_keyframe_descriptions("no labels here", &paths(3)).is_empty());
    }

    #[test]
    fn test_fallback_descriptions() {
        let analysis = fallback_descriptions(&paths(2));
        assert_eq!(analysis.len(), 2);
        assert!(analysis.iter().all(|a| a.description == DESCRIPTION_ERROR));
        assert_eq!(analysis[1].frame, "keyframe_2");
    }

    #[test]
    fn test_full_content() {
        let analysis = split_keyframe_descriptions("Keyframe 1: a\nKeyframe 2: b", &paths(2));
        let combined = combine_keyframe_descriptions(&analysis);
        assert_eq!(combined, "1: a\n2: b");

        assert_eq!(create_full_content(&combined, None), combined);
        assert_eq!(create_full_content(&combined, Some("")), combined);
        assert_eq!(
            create_full_content("desc", Some("hello")),
            "desc\n\nTranscription: hello"
        );
    }
}
