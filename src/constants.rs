/// CAS（Compare-And-Swap）操作最大重试次数
pub const MAX_CAS_RETRIES: u32 = 20;

/// 每个学习会话生成的提问数量
pub const QUESTIONS_PER_SESSION: usize = 7;

/// 话题输入最大长度（字符）
pub const MAX_TOPIC_INPUT_CHARS: usize = 200;

/// 单个回答最大长度（字符）
pub const MAX_ANSWER_INPUT_CHARS: usize = 2_000;

/// 会话记录列表默认分页大小
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// 会话记录列表最大分页大小
pub const MAX_PAGE_SIZE: usize = 100;

/// 回答得分上限
pub const MAX_ANSWER_SCORE: f64 = 100.0;
